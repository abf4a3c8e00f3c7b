//! Gathers contextual subword embeddings back to words and prompt markers.

use ndarray::{Array1, Array2};

use crate::tokenizer::{PromptKind, SchemaEncoding, Segment};
use crate::{Error, Result};

/// One schema marker's pooled embedding.
#[derive(Debug, Clone)]
pub struct PromptEmbedding {
    /// Marker kind.
    pub kind: PromptKind,
    /// Pooled hidden-state vector.
    pub vector: Array1<f32>,
}

/// Project encoder hidden states `[T, H]` onto (a) one vector per text word
/// and (b) one vector per schema prompt marker, grouped by schema group.
///
/// Word vectors take the hidden state of the word's *first* subword. Marker
/// vectors are the arithmetic mean over the marker's subword range, because
/// special markers may themselves expand to several subwords.
pub fn project(
    hidden: &Array2<f32>,
    encoding: &SchemaEncoding,
) -> Result<(Array2<f32>, Vec<Vec<PromptEmbedding>>)> {
    let (seq_len, hidden_size) = hidden.dim();
    if seq_len != encoding.input_ids.len() {
        return Err(Error::encoding(format!(
            "hidden state rows ({seq_len}) do not match encoded subwords ({})",
            encoding.input_ids.len()
        )));
    }
    if encoding.mappings.len() != encoding.input_ids.len() {
        return Err(Error::encoding(format!(
            "mapping count ({}) does not match encoded subwords ({})",
            encoding.mappings.len(),
            encoding.input_ids.len()
        )));
    }

    let num_words = encoding.text_words.len();
    let mut word_embeddings = Array2::<f32>::zeros((num_words, hidden_size));
    let mut seen = vec![false; num_words];

    for (position, mapping) in encoding.mappings.iter().enumerate() {
        if mapping.segment != Segment::Text {
            continue;
        }
        let word = mapping.token_index.wrapping_sub(encoding.text_start);
        if word >= num_words {
            return Err(Error::encoding(format!(
                "text mapping at subword {position} points past word list ({word} >= {num_words})"
            )));
        }
        if !seen[word] {
            word_embeddings.row_mut(word).assign(&hidden.row(position));
            seen[word] = true;
        }
    }

    if let Some(missing) = seen.iter().position(|found| !found) {
        return Err(Error::encoding(format!(
            "word {missing} has no first-subword mapping"
        )));
    }

    let mut groups: Vec<Vec<PromptEmbedding>> = vec![Vec::new(); encoding.num_groups];
    for location in &encoding.prompt_locations {
        if location.start >= location.end || location.end > seq_len {
            return Err(Error::encoding(format!(
                "prompt location {:?} spans empty or out-of-range subwords {}..{}",
                location.kind, location.start, location.end
            )));
        }
        let width = (location.end - location.start) as f32;
        let mut pooled = Array1::<f32>::zeros(hidden_size);
        for row in location.start..location.end {
            pooled += &hidden.row(row);
        }
        pooled /= width;

        let group = groups.get_mut(location.group).ok_or_else(|| {
            Error::encoding(format!(
                "prompt location references group {} of {}",
                location.group, encoding.num_groups
            ))
        })?;
        group.push(PromptEmbedding {
            kind: location.kind,
            vector: pooled,
        });
    }

    Ok((word_embeddings, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{PromptLocation, SubwordMapping, Word};

    /// Hand-built encoding: [CLS] [P] [E] lab [SEP_TEXT] w0a w0b w1 [SEP]
    fn encoding() -> SchemaEncoding {
        let segment = |s, t| SubwordMapping {
            segment: s,
            token_index: t,
            schema_group: 0,
        };
        SchemaEncoding {
            schema_tokens: vec!["[P]".into(), "[E]".into(), "lab".into()],
            text_words: vec![
                Word {
                    text: "alpha".into(),
                    start: 0,
                    end: 5,
                },
                Word {
                    text: "beta".into(),
                    start: 6,
                    end: 10,
                },
            ],
            input_ids: vec![2, 200, 201, 9, 202, 10, 11, 12, 3],
            attention_mask: vec![1; 9],
            mappings: vec![
                segment(Segment::Separator, 0),
                segment(Segment::Schema, 1),
                segment(Segment::Schema, 2),
                segment(Segment::Schema, 3),
                segment(Segment::Separator, 4),
                segment(Segment::Text, 5),
                segment(Segment::Text, 5),
                segment(Segment::Text, 6),
                segment(Segment::Separator, 7),
            ],
            prompt_locations: vec![
                PromptLocation {
                    kind: PromptKind::Prompt,
                    start: 1,
                    end: 2,
                    group: 0,
                },
                PromptLocation {
                    kind: PromptKind::Entity,
                    start: 2,
                    end: 4,
                    group: 0,
                },
            ],
            num_groups: 1,
            text_start: 5,
            span_indices: vec![[0, 0], [0, 1], [1, 1], [0, 0]],
            span_mask: vec![1.0, 1.0, 1.0, 0.0],
            entity_labels: vec!["lab".into()],
        }
    }

    fn hidden() -> Array2<f32> {
        let mut h = Array2::<f32>::zeros((9, 2));
        for row in 0..9 {
            h[[row, 0]] = row as f32;
            h[[row, 1]] = 10.0 + row as f32;
        }
        h
    }

    #[test]
    fn word_embeddings_take_first_subword() {
        let (words, _) = project(&hidden(), &encoding()).unwrap();
        assert_eq!(words.dim(), (2, 2));
        // word 0's first subword is position 5
        assert_eq!(words[[0, 0]], 5.0);
        // word 1's only subword is position 7
        assert_eq!(words[[1, 0]], 7.0);
    }

    #[test]
    fn prompt_embeddings_mean_pool_their_range() {
        let (_, groups) = project(&hidden(), &encoding()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0][0].kind, PromptKind::Prompt);
        assert_eq!(groups[0][0].vector[0], 1.0);
        // [E] marker spans positions 2..4, mean of rows 2 and 3
        assert_eq!(groups[0][1].kind, PromptKind::Entity);
        assert_eq!(groups[0][1].vector[0], 2.5);
    }

    #[test]
    fn missing_word_mapping_is_an_encoding_error() {
        let mut enc = encoding();
        // Point word 1's mapping elsewhere
        enc.mappings[7].segment = Segment::Schema;
        let err = project(&hidden(), &enc).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "got {err:?}");
    }

    #[test]
    fn hidden_length_mismatch_is_an_encoding_error() {
        let short = Array2::<f32>::zeros((4, 2));
        let err = project(&short, &encoding()).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "got {err:?}");
    }

    #[test]
    fn empty_prompt_range_is_an_encoding_error() {
        let mut enc = encoding();
        enc.prompt_locations[0].end = enc.prompt_locations[0].start;
        let err = project(&hidden(), &enc).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)), "got {err:?}");
    }
}
