//! GLiNER2 schema prompt construction.
//!
//! The schema encoding interleaves prompt markers, label strings, a text
//! separator, and the word-level text into one subword stream:
//!
//! ```text
//! [CLS] ( [P] entities ( [E] label1 [E] label2 ... ) ) [SEP_TEXT] word1 word2 ... [SEP]
//! ```
//!
//! Every produced subword records which coarse token it came from and which
//! segment (schema / separator / text) it belongs to, so the projector can
//! gather contextual embeddings back to words and prompt markers. Span
//! planning for the span-rep head happens here too, because it only depends
//! on the word count and the maximum span width.

use serde::{Deserialize, Serialize};

use super::Tokenizer;
use crate::{Error, Result};

/// A text word with its character range in the original input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Surface form, verbatim.
    pub text: String,
    /// Start character offset (inclusive).
    pub start: u32,
    /// End character offset (exclusive).
    pub end: u32,
}

/// Semantic segment of a subword position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// Part of a schema prompt group.
    Schema,
    /// Structural token: `[CLS]`, `[SEP_TEXT]`, `[SEP_STRUCT]`, `[SEP]`.
    Separator,
    /// Part of the input text.
    Text,
}

/// Kind of a schema prompt marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptKind {
    /// Task prompt marker `[P]`.
    Prompt,
    /// Entity class marker `[E]`.
    Entity,
    /// Relation marker `[R]`.
    Relation,
    /// Classification label marker `[L]`.
    Classification,
    /// List/field marker `[C]`.
    List,
}

/// Per-subword provenance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubwordMapping {
    /// Segment the subword belongs to.
    pub segment: Segment,
    /// Index of the coarse token it expanded from.
    pub token_index: usize,
    /// Schema group the subword belongs to (0 for the entity-only prompt).
    pub schema_group: usize,
}

/// Subword range occupied by one schema marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptLocation {
    /// Marker kind.
    pub kind: PromptKind,
    /// First subword index (inclusive).
    pub start: usize,
    /// Last subword index (exclusive).
    pub end: usize,
    /// Schema group the marker belongs to.
    pub group: usize,
}

/// Full schema encoding, consumed by every downstream pipeline stage.
#[derive(Debug, Clone)]
pub struct SchemaEncoding {
    /// Ordered coarse schema tokens (parentheses, markers, labels).
    pub schema_tokens: Vec<String>,
    /// Word list from the input, with character ranges.
    pub text_words: Vec<Word>,
    /// Fully tokenized subword IDs.
    pub input_ids: Vec<u32>,
    /// Attention mask (all ones; the schema path never pads).
    pub attention_mask: Vec<u32>,
    /// One provenance record per subword.
    pub mappings: Vec<SubwordMapping>,
    /// Marker locations, in schema order.
    pub prompt_locations: Vec<PromptLocation>,
    /// Number of schema groups in the prompt.
    pub num_groups: usize,
    /// Coarse index of the first text word.
    pub text_start: usize,
    /// Flat `[start_word, end_word]` pairs, `|text_words| * max_width` long.
    pub span_indices: Vec<[u32; 2]>,
    /// 1.0 on valid span entries, 0.0 on padding. Same length as
    /// `span_indices`.
    pub span_mask: Vec<f32>,
    /// The caller's labels, in order.
    pub entity_labels: Vec<String>,
}

impl SchemaEncoding {
    /// Character ranges of the text words.
    #[must_use]
    pub fn text_word_ranges(&self) -> Vec<(u32, u32)> {
        self.text_words.iter().map(|w| (w.start, w.end)).collect()
    }
}

/// Split text into words: contiguous runs of letters/digits (allowing
/// internal `-`/`_`), or single non-whitespace characters. Each word carries
/// its character range in the input.
#[must_use]
pub fn split_words(text: &str) -> Vec<Word> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut words = Vec::new();
    let mut i = 0;

    while i < n {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_alphanumeric() {
            let start = i;
            let mut j = i + 1;
            while j < n {
                let cj = chars[j];
                if cj.is_alphanumeric() {
                    j += 1;
                } else if (cj == '-' || cj == '_')
                    && j + 1 < n
                    && chars[j + 1].is_alphanumeric()
                {
                    j += 2;
                } else {
                    break;
                }
            }
            words.push(Word {
                text: chars[start..j].iter().collect(),
                start: start as u32,
                end: j as u32,
            });
            i = j;
        } else {
            words.push(Word {
                text: c.to_string(),
                start: i as u32,
                end: (i + 1) as u32,
            });
            i += 1;
        }
    }

    words
}

/// Plan span candidates for the span-rep head: `(s, s + w)` pairs filled
/// row-major over `num_words * max_width`, with `[0, 0]`/mask-0 padding where
/// the end word would fall outside the text.
#[must_use]
pub fn plan_spans(num_words: usize, max_width: usize) -> (Vec<[u32; 2]>, Vec<f32>) {
    let total = num_words * max_width;
    let mut indices = vec![[0u32, 0u32]; total];
    let mut mask = vec![0.0f32; total];
    for start in 0..num_words {
        for width in 0..max_width {
            if start + width < num_words {
                let slot = start * max_width + width;
                indices[slot] = [start as u32, (start + width) as u32];
                mask[slot] = 1.0;
            }
        }
    }
    (indices, mask)
}

fn marker_kind(tokenizer: &Tokenizer, surface: &str) -> Option<PromptKind> {
    if surface == tokenizer.prompt_token() {
        Some(PromptKind::Prompt)
    } else if surface == tokenizer.ent_token() {
        Some(PromptKind::Entity)
    } else {
        match surface {
            "[R]" => Some(PromptKind::Relation),
            "[L]" => Some(PromptKind::Classification),
            "[C]" => Some(PromptKind::List),
            _ => None,
        }
    }
}

impl Tokenizer {
    /// Build the full GLiNER2 schema encoding for an entity extraction
    /// prompt.
    ///
    /// Schema tokens for the entity task are literally `(`, `[P]`,
    /// `entities`, `(`, then `[E]` + label per label, then `)`, `)`. The text
    /// separator marker precedes the text words, which are lower-cased
    /// before subword tokenization. Special-token strings resolve through
    /// the registry and are never re-tokenized.
    ///
    /// Fails with [`Error::Tokenizer`] when the total subword count exceeds
    /// the sequence budget.
    pub fn encode_gliner2_schema(
        &self,
        text: &str,
        labels: &[&str],
        max_span_width: usize,
    ) -> Result<SchemaEncoding> {
        let mut schema_tokens: Vec<String> = Vec::with_capacity(labels.len() * 2 + 6);
        schema_tokens.push("(".to_string());
        schema_tokens.push(self.prompt_token().to_string());
        schema_tokens.push("entities".to_string());
        schema_tokens.push("(".to_string());
        for label in labels {
            schema_tokens.push(self.ent_token().to_string());
            schema_tokens.push((*label).to_string());
        }
        schema_tokens.push(")".to_string());
        schema_tokens.push(")".to_string());

        let text_words = split_words(text);

        let mut input_ids: Vec<u32> = Vec::new();
        let mut mappings: Vec<SubwordMapping> = Vec::new();
        let mut prompt_locations: Vec<PromptLocation> = Vec::new();

        let emit_special = |ids: &mut Vec<u32>,
                                maps: &mut Vec<SubwordMapping>,
                                id: u32,
                                segment: Segment,
                                token_index: usize,
                                group: usize| {
            ids.push(id);
            maps.push(SubwordMapping {
                segment,
                token_index,
                schema_group: group,
            });
        };

        let mut coarse_index = 0usize;

        // [CLS]
        let cls = self.special("[CLS]")?;
        emit_special(
            &mut input_ids,
            &mut mappings,
            cls,
            Segment::Separator,
            coarse_index,
            0,
        );
        coarse_index += 1;

        // Schema group 0. (The coarse stream supports [SEP_STRUCT]-separated
        // groups; the entity prompt always produces exactly one.)
        let group = 0usize;
        for surface in &schema_tokens {
            if let Some(id) = self.model().special_id(surface) {
                let start = input_ids.len();
                emit_special(
                    &mut input_ids,
                    &mut mappings,
                    id,
                    Segment::Schema,
                    coarse_index,
                    group,
                );
                if let Some(kind) = marker_kind(self, surface) {
                    prompt_locations.push(PromptLocation {
                        kind,
                        start,
                        end: input_ids.len(),
                        group,
                    });
                }
            } else {
                for piece in self.model().tokenize(surface) {
                    input_ids.push(piece.id);
                    mappings.push(SubwordMapping {
                        segment: Segment::Schema,
                        token_index: coarse_index,
                        schema_group: group,
                    });
                }
            }
            coarse_index += 1;
        }

        // Text separator marker.
        let text_sep = self.special(self.sep_token())?;
        emit_special(
            &mut input_ids,
            &mut mappings,
            text_sep,
            Segment::Separator,
            coarse_index,
            group,
        );
        coarse_index += 1;

        // Text words, lower-cased for tokenization only.
        let text_start = coarse_index;
        for word in &text_words {
            let lowered = word.text.to_lowercase();
            for piece in self.model().tokenize(&lowered) {
                input_ids.push(piece.id);
                mappings.push(SubwordMapping {
                    segment: Segment::Text,
                    token_index: coarse_index,
                    schema_group: group,
                });
            }
            coarse_index += 1;
        }

        // Final [SEP].
        let sep = self.special("[SEP]")?;
        emit_special(
            &mut input_ids,
            &mut mappings,
            sep,
            Segment::Separator,
            coarse_index,
            group,
        );

        if input_ids.len() > self.max_length() {
            return Err(Error::tokenizer(format!(
                "schema encoding of {} subwords exceeds max length {}",
                input_ids.len(),
                self.max_length()
            )));
        }

        let (span_indices, span_mask) = plan_spans(text_words.len(), max_span_width);
        let attention_mask = vec![1u32; input_ids.len()];

        Ok(SchemaEncoding {
            schema_tokens,
            text_words,
            input_ids,
            attention_mask,
            mappings,
            prompt_locations,
            num_groups: 1,
            text_start,
            span_indices,
            span_mask,
            entity_labels: labels.iter().map(|s| (*s).to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SpanHeadMetadata;
    use crate::tokenizer::unigram::UnigramModel;
    use std::sync::Arc;

    fn word_texts(text: &str) -> Vec<String> {
        split_words(text).into_iter().map(|w| w.text).collect()
    }

    #[test]
    fn words_split_on_whitespace_and_punctuation() {
        assert_eq!(word_texts("John works at Apple."), vec![
            "John", "works", "at", "Apple", "."
        ]);
    }

    #[test]
    fn words_keep_internal_hyphen_and_underscore() {
        assert_eq!(word_texts("state-of-the-art snake_case"), vec![
            "state-of-the-art",
            "snake_case"
        ]);
        // A trailing hyphen is not internal
        assert_eq!(word_texts("well- done"), vec!["well", "-", "done"]);
    }

    #[test]
    fn words_carry_character_ranges() {
        let words = split_words("héllo wörld");
        assert_eq!(words[0].start, 0);
        assert_eq!(words[0].end, 5);
        assert_eq!(words[1].start, 6);
        assert_eq!(words[1].end, 11);
    }

    #[test]
    fn span_planning_masks_out_of_range_entries() {
        let (indices, mask) = plan_spans(3, 2);
        assert_eq!(indices.len(), 6);
        assert_eq!(mask.len(), 6);
        assert_eq!(indices[0], [0, 0]);
        assert_eq!(indices[1], [0, 1]);
        assert_eq!(indices[4], [2, 2]);
        // (start 2, width 1) would end at word 3, out of range
        assert_eq!(indices[5], [0, 0]);
        assert_eq!(mask[5], 0.0);
        assert!(mask.iter().all(|&m| m == 0.0 || m == 1.0));
        for (slot, entry) in indices.iter().enumerate() {
            let valid = (entry[1] as usize) < 3 && mask[slot] == 1.0;
            let padding = *entry == [0, 0] && mask[slot] == 0.0;
            assert!(valid || padding);
        }
    }

    fn fixture() -> Tokenizer {
        let vocab = vec![
            ("[UNK]".to_string(), 0.0),
            ("[PAD]".to_string(), 0.0),
            ("[CLS]".to_string(), 0.0),
            ("[SEP]".to_string(), 0.0),
            ("\u{2581}(".to_string(), -1.0),
            ("\u{2581})".to_string(), -1.0),
            ("\u{2581}entities".to_string(), -1.0),
            ("\u{2581}person".to_string(), -1.0),
            ("\u{2581}john".to_string(), -1.0),
            ("\u{2581}wo".to_string(), -1.0),
            ("rks".to_string(), -1.0),
        ];
        let model = Arc::new(UnigramModel::new(vocab, 0).unwrap());
        model.register_special("[UNK]", 0);
        model.register_special("[PAD]", 1);
        model.register_special("[CLS]", 2);
        model.register_special("[SEP]", 3);

        let metadata: SpanHeadMetadata = serde_json::from_value(serde_json::json!({
            "hidden_size": 4,
            "max_width": 2,
            "class_token_index": 201,
            "ent_token": "[E]",
            "sep_token": "[SEP_TEXT]",
            "special_tokens": {
                "prompt_token": "[P]",
                "prompt_token_index": 200,
                "ent_token_index": 201,
                "sep_token_index": 202,
                "cls_token_index": 2,
                "base_sep_token_index": 3,
                "pad_token_index": 1,
                "mask_token_index": 204,
                "unk_token_index": 0
            }
        }))
        .unwrap();
        Tokenizer::new(model, 64, &metadata).unwrap()
    }

    #[test]
    fn schema_encoding_layout_and_mappings() {
        let tok = fixture();
        let enc = tok
            .encode_gliner2_schema("John works", &["person"], 2)
            .unwrap();

        // Coarse schema token stream
        assert_eq!(
            enc.schema_tokens,
            vec!["(", "[P]", "entities", "(", "[E]", "person", ")", ")"]
        );

        // One mapping per subword
        assert_eq!(enc.mappings.len(), enc.input_ids.len());
        assert_eq!(enc.attention_mask.len(), enc.input_ids.len());
        assert!(enc.attention_mask.iter().all(|&m| m == 1));

        // Markers resolved through the registry, never re-tokenized
        assert!(enc.input_ids.contains(&200));
        assert!(enc.input_ids.contains(&201));
        assert!(enc.input_ids.contains(&202));

        // Two markers recorded: [P] then [E]
        assert_eq!(enc.prompt_locations.len(), 2);
        assert_eq!(enc.prompt_locations[0].kind, PromptKind::Prompt);
        assert_eq!(enc.prompt_locations[1].kind, PromptKind::Entity);
        assert_eq!(enc.num_groups, 1);

        // "works" tokenizes into two pieces; both map to the same word
        let word_mappings: Vec<&SubwordMapping> = enc
            .mappings
            .iter()
            .filter(|m| m.segment == Segment::Text)
            .collect();
        assert_eq!(word_mappings.len(), 3); // ▁john + ▁wo + rks
        assert_eq!(word_mappings[0].token_index, enc.text_start);
        assert_eq!(word_mappings[1].token_index, enc.text_start + 1);
        assert_eq!(word_mappings[2].token_index, enc.text_start + 1);

        // Span planning
        assert_eq!(enc.span_indices.len(), enc.text_words.len() * 2);
        assert_eq!(enc.span_mask.len(), enc.span_indices.len());

        // Word ranges point into the original (pre-lowercase) text
        assert_eq!(enc.text_words[0].text, "John");
        assert_eq!(enc.text_word_ranges(), vec![(0, 4), (5, 10)]);

        assert_eq!(enc.entity_labels, vec!["person".to_string()]);
    }

    #[test]
    fn schema_encoding_empty_text_has_no_words() {
        let tok = fixture();
        let enc = tok.encode_gliner2_schema("", &["person"], 2).unwrap();
        assert!(enc.text_words.is_empty());
        assert!(enc.span_indices.is_empty());
        // Schema and separators still present
        assert!(enc.input_ids.len() > 4);
    }

    #[test]
    fn schema_encoding_overflow_is_rejected() {
        let tok = fixture();
        let text = "john ".repeat(100);
        let err = tok
            .encode_gliner2_schema(&text, &["person"], 2)
            .unwrap_err();
        assert!(matches!(err, Error::Tokenizer(_)), "got {err:?}");
    }

    #[test]
    fn freshly_registered_marker_is_honoured() {
        let tok = fixture();
        tok.register_special("[E]", 57);
        let enc = tok
            .encode_gliner2_schema("John works", &["person"], 2)
            .unwrap();
        assert!(enc.input_ids.contains(&57));
        assert!(!enc.input_ids.contains(&201));
    }
}
