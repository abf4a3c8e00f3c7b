//! Greedy span decoding with overlap suppression.

use ndarray::Array3;

use crate::entity::{char_slice, Entity};
use crate::tokenizer::Word;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    start_word: usize,
    end_word: usize,
    label_index: usize,
    prob: f32,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode a `[words × widths × labels]` score tensor into entities.
///
/// Candidates pass the sigmoid threshold, are walked in descending
/// probability order, and are greedily accepted unless their word interval
/// (inclusive on both ends) intersects an already-accepted candidate's.
/// Suppression ignores labels, so the decoder emits at most one label per
/// text region. Accepted spans come back ordered by start word, ties broken
/// by probability, and carry character offsets from the word ranges.
///
/// Empty score tensors, empty word lists, or zero labels produce an empty
/// result without error.
#[must_use]
pub fn decode(
    scores: &Array3<f32>,
    labels: &[String],
    threshold: f32,
    text: &str,
    words: &[Word],
) -> Vec<Entity> {
    let (num_words, max_width, num_labels) = scores.dim();
    if num_words == 0 || words.is_empty() || num_labels == 0 || labels.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for word in 0..num_words {
        for width in 0..max_width {
            let end_word = word + width;
            if end_word >= words.len() {
                continue;
            }
            for label in 0..num_labels.min(labels.len()) {
                let prob = sigmoid(scores[[word, width, label]]);
                if prob >= threshold {
                    candidates.push(Candidate {
                        start_word: word,
                        end_word,
                        label_index: label,
                        prob,
                    });
                }
            }
        }
    }

    // Highest probability first; sort_by is stable so equal-probability
    // candidates keep scan order (shorter spans first for the same start).
    candidates.sort_by(|a, b| {
        b.prob
            .partial_cmp(&a.prob)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut accepted: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = accepted.iter().any(|kept| {
            candidate.start_word <= kept.end_word && kept.start_word <= candidate.end_word
        });
        if !overlaps {
            accepted.push(candidate);
        }
    }

    accepted.sort_by(|a, b| {
        a.start_word.cmp(&b.start_word).then_with(|| {
            b.prob
                .partial_cmp(&a.prob)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    accepted
        .into_iter()
        .map(|candidate| {
            let char_start = words[candidate.start_word].start;
            let char_end = words[candidate.end_word].end;
            Entity::new(
                char_slice(text, char_start as usize, char_end as usize),
                labels[candidate.label_index].clone(),
                candidate.prob,
                char_start,
                char_end,
            )
        })
        .collect()
}
