//! Property tests for the chunker and merger invariants.

use gliner2_runtime::{merge_entities, word_count, Chunker, ChunkerConfig, Entity};
use proptest::prelude::*;

fn chunker(max_chars: usize, overlap: usize, max_words: usize) -> Chunker {
    Chunker::new(&ChunkerConfig {
        max_chars,
        overlap_chars: overlap,
        max_words,
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every non-whitespace character of the input is covered by some chunk,
    /// every chunk honours the word budget, and the chunk text matches the
    /// character range it claims.
    #[test]
    fn chunks_cover_and_respect_budgets(
        words in prop::collection::vec("[a-zA-Z]{1,12}", 1..400),
        max_words in 8usize..64,
        overlap in 0usize..64,
    ) {
        let text = words.join(" ");
        let c = chunker(256, overlap, max_words);
        let chunks = c.chunk(&text);

        let chars: Vec<char> = text.chars().collect();
        let mut covered = vec![false; chars.len()];
        for chunk in &chunks {
            prop_assert!(!chunk.text.is_empty());
            prop_assert!(word_count(&chunk.text) <= max_words);

            let slice: String = chars[chunk.start as usize..chunk.end as usize]
                .iter()
                .collect();
            prop_assert_eq!(&chunk.text, &slice);

            for slot in chunk.start as usize..chunk.end as usize {
                covered[slot] = true;
            }
        }
        for (slot, &ch) in chars.iter().enumerate() {
            if !ch.is_whitespace() {
                prop_assert!(covered[slot], "character {} uncovered", slot);
            }
        }
    }

    /// Texts inside the word budget come back as exactly one chunk.
    #[test]
    fn small_text_is_single_chunk(
        words in prop::collection::vec("[a-z]{1,8}", 1..40),
    ) {
        let text = words.join(" ");
        let c = chunker(1600, 200, 240);
        prop_assert!(!c.should_chunk(&text));
        let chunks = c.chunk(&text);
        prop_assert_eq!(chunks.len(), 1);
        prop_assert_eq!(&chunks[0].text, &text);
    }

    /// The cursor strictly advances: chunk starts are strictly increasing
    /// and adjacent overlap never exceeds the configured overlap.
    #[test]
    fn chunk_starts_advance(
        words in prop::collection::vec("[a-z]{1,10}", 50..300),
        overlap in 0usize..64,
    ) {
        let text = words.join(" ");
        let c = chunker(256, overlap, 24);
        let chunks = c.chunk(&text);
        for pair in chunks.windows(2) {
            prop_assert!(pair[1].start > pair[0].start);
            let shared = pair[0].end.saturating_sub(pair[1].start) as usize;
            prop_assert!(shared <= overlap, "overlap {} > {}", shared, overlap);
        }
    }

    /// Merging never invents entities, keeps the top score per duplicate
    /// group, and leaves no same-label overlapping pair behind.
    #[test]
    fn merge_is_sound(
        spans in prop::collection::vec((0u32..200, 1u32..12, 0usize..3, 0u32..1000), 0..40),
    ) {
        let labels = ["person", "company", "location"];
        let entities: Vec<Entity> = spans
            .iter()
            .map(|&(start, len, label, score)| {
                Entity::new(
                    format!("t{start}"),
                    labels[label],
                    score as f32 / 1000.0,
                    start,
                    start + len,
                )
            })
            .collect();

        let merged = merge_entities(entities.clone());
        prop_assert!(merged.len() <= entities.len());

        for kept in &merged {
            prop_assert!(entities.iter().any(|e| e == kept));
        }
        for (i, a) in merged.iter().enumerate() {
            for b in merged.iter().skip(i + 1) {
                let dup = a.label == b.label
                    && (a.text.eq_ignore_ascii_case(&b.text) || a.overlaps(b));
                prop_assert!(!dup, "{} and {} still duplicates", a, b);
            }
        }

        // The global top scorer always survives.
        if let Some(top) = entities
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap())
        {
            prop_assert!(merged.iter().any(|e| e.score >= top.score));
        }
    }
}
