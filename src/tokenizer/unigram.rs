//! SentencePiece Unigram model with Viterbi decoding.
//!
//! The model is immutable after loading, except for the special-token
//! registry which is guarded by a mutex. The Viterbi hot path keeps its work
//! arrays in thread-local scratch so repeated calls on the same thread do not
//! hit the allocator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;
use unicode_normalization::UnicodeNormalization;

use crate::{Error, Result};

/// SentencePiece word-boundary marker (U+2581).
pub const CONTINUATION_MARKER: char = '\u{2581}';

/// Score assigned to single-character `[UNK]` lattice candidates.
const UNK_PENALTY: f32 = -100.0;

/// One subword token: vocabulary ID plus surface form.
#[derive(Debug, Clone, PartialEq)]
pub struct SubwordToken {
    /// Vocabulary ID.
    pub id: u32,
    /// Surface form of the piece as matched in the normalized text.
    pub surface: String,
}

/// Loaded Unigram vocabulary with log-probability scores.
#[derive(Debug)]
pub struct UnigramModel {
    pieces: HashMap<String, (u32, f32)>,
    surfaces: HashMap<u32, String>,
    unk_id: u32,
    max_piece_chars: usize,
    specials: Mutex<HashMap<String, u32>>,
}

struct ViterbiScratch {
    chars: Vec<char>,
    best_score: Vec<f32>,
    back_len: Vec<usize>,
    back_id: Vec<u32>,
    key: String,
}

impl ViterbiScratch {
    const fn new() -> Self {
        Self {
            chars: Vec::new(),
            best_score: Vec::new(),
            back_len: Vec::new(),
            back_id: Vec::new(),
            key: String::new(),
        }
    }
}

thread_local! {
    static SCRATCH: RefCell<ViterbiScratch> = const { RefCell::new(ViterbiScratch::new()) };
}

impl UnigramModel {
    /// Build a model from `(surface, score)` vocabulary entries.
    ///
    /// The vocabulary index of each entry is its token ID. `unk_id` must name
    /// a valid entry. Added tokens (explicit ID + surface) are layered on via
    /// [`UnigramModel::register_special`] by the loader.
    pub fn new(vocab: Vec<(String, f32)>, unk_id: u32) -> Result<Self> {
        if vocab.is_empty() {
            return Err(Error::tokenizer("empty unigram vocabulary"));
        }
        if unk_id as usize >= vocab.len() {
            return Err(Error::tokenizer(format!(
                "unk_id {unk_id} out of range for vocabulary of {}",
                vocab.len()
            )));
        }

        let mut pieces = HashMap::with_capacity(vocab.len());
        let mut surfaces = HashMap::with_capacity(vocab.len());
        let mut max_piece_chars = 1;
        for (id, (surface, score)) in vocab.into_iter().enumerate() {
            let id = id as u32;
            max_piece_chars = max_piece_chars.max(surface.chars().count());
            surfaces.insert(id, surface.clone());
            pieces.insert(surface, (id, score));
        }

        Ok(Self {
            pieces,
            surfaces,
            unk_id,
            max_piece_chars,
            specials: Mutex::new(HashMap::new()),
        })
    }

    /// ID of the unknown token.
    #[must_use]
    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    /// Surface form for a token ID, if known.
    #[must_use]
    pub fn surface(&self, id: u32) -> Option<&str> {
        self.surfaces.get(&id).map(String::as_str)
    }

    /// Register a special token by surface and fixed ID. Specials are looked
    /// up verbatim during prompt construction and never re-tokenized.
    pub fn register_special(&self, surface: impl Into<String>, id: u32) {
        let surface = surface.into();
        let mut specials = match self.specials.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        specials.insert(surface, id);
    }

    /// Look up a registered special token ID.
    #[must_use]
    pub fn special_id(&self, surface: &str) -> Option<u32> {
        let specials = match self.specials.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        specials.get(surface).copied()
    }

    /// SentencePiece text normalisation:
    ///
    /// 1. strip leading/trailing whitespace,
    /// 2. NFKC,
    /// 3. collapse whitespace runs (including U+3000 and U+FEFF) to one
    ///    ASCII space,
    /// 4. prepend a space if non-empty and not already space-prefixed,
    /// 5. replace each space with U+2581.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let trimmed = text.trim();
        let mut collapsed = String::with_capacity(trimmed.len() + 1);
        let mut in_whitespace = false;
        for c in trimmed.nfkc() {
            if c.is_whitespace() || c == '\u{feff}' {
                if !in_whitespace {
                    collapsed.push(' ');
                }
                in_whitespace = true;
            } else {
                collapsed.push(c);
                in_whitespace = false;
            }
        }

        let mut out = String::with_capacity(collapsed.len() + 4);
        if !collapsed.is_empty() && !collapsed.starts_with(' ') {
            out.push(CONTINUATION_MARKER);
        }
        for c in collapsed.chars() {
            out.push(if c == ' ' { CONTINUATION_MARKER } else { c });
        }
        out
    }

    /// Tokenize text into subword pieces via Viterbi over the normalized
    /// character sequence.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<SubwordToken> {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        SCRATCH.with(|cell| {
            let mut scratch = cell.borrow_mut();
            self.viterbi(&normalized, &mut scratch)
        })
    }

    fn viterbi(&self, normalized: &str, scratch: &mut ViterbiScratch) -> Vec<SubwordToken> {
        scratch.chars.clear();
        scratch.chars.extend(normalized.chars());
        let n = scratch.chars.len();

        scratch.best_score.clear();
        scratch.best_score.resize(n + 1, f32::NEG_INFINITY);
        scratch.best_score[0] = 0.0;
        scratch.back_len.clear();
        scratch.back_len.resize(n + 1, 0);
        scratch.back_id.clear();
        scratch.back_id.resize(n + 1, self.unk_id);

        for start in 0..n {
            let base = scratch.best_score[start];
            if base == f32::NEG_INFINITY {
                continue;
            }

            let max_len = self.max_piece_chars.min(n - start);
            let mut matched_any = false;
            scratch.key.clear();
            for (offset, c) in scratch.chars[start..start + max_len].iter().enumerate() {
                scratch.key.push(*c);
                if let Some(&(id, score)) = self.pieces.get(scratch.key.as_str()) {
                    matched_any = true;
                    let len = offset + 1;
                    let candidate = base + score;
                    if candidate > scratch.best_score[start + len] {
                        scratch.best_score[start + len] = candidate;
                        scratch.back_len[start + len] = len;
                        scratch.back_id[start + len] = id;
                    }
                }
            }

            // No piece starts here: fall back to a single-character [UNK]
            // lattice candidate so the path stays connected.
            if !matched_any {
                let candidate = base + UNK_PENALTY;
                if candidate > scratch.best_score[start + 1] {
                    scratch.best_score[start + 1] = candidate;
                    scratch.back_len[start + 1] = 1;
                    scratch.back_id[start + 1] = self.unk_id;
                }
            }
        }

        let mut tokens = Vec::new();
        let mut pos = n;
        while pos > 0 {
            let len = scratch.back_len[pos];
            if len == 0 {
                // Disconnected position: emit one [UNK] character and retreat.
                tokens.push(SubwordToken {
                    id: self.unk_id,
                    surface: scratch.chars[pos - 1].to_string(),
                });
                pos -= 1;
            } else {
                let surface: String = scratch.chars[pos - len..pos].iter().collect();
                tokens.push(SubwordToken {
                    id: scratch.back_id[pos],
                    surface,
                });
                pos -= len;
            }
        }
        tokens.reverse();
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(entries: &[(&str, f32)]) -> UnigramModel {
        let vocab: Vec<(String, f32)> = entries
            .iter()
            .map(|(surface, score)| (surface.to_string(), *score))
            .collect();
        UnigramModel::new(vocab, 0).unwrap()
    }

    #[test]
    fn normalization_collapses_and_marks() {
        let m = model(&[("[UNK]", 0.0)]);
        assert_eq!(m.normalize("  hello  world "), "\u{2581}hello\u{2581}world");
        assert_eq!(m.normalize("a\u{3000}b"), "\u{2581}a\u{2581}b");
        assert_eq!(m.normalize("a\u{feff}b"), "\u{2581}a\u{2581}b");
        assert_eq!(m.normalize(""), "");
        // NFKC folds the fullwidth form
        assert_eq!(m.normalize("Ｈi"), "\u{2581}Hi");
    }

    #[test]
    fn viterbi_prefers_higher_scoring_segmentation() {
        // "▁ab" as one piece scores better than "▁a" + "b"
        let m = model(&[
            ("[UNK]", 0.0),
            ("\u{2581}ab", -1.0),
            ("\u{2581}a", -2.0),
            ("b", -2.0),
        ]);
        let tokens = m.tokenize("ab");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].surface, "\u{2581}ab");
        assert_eq!(tokens[0].id, 1);
    }

    #[test]
    fn viterbi_splits_when_split_scores_better() {
        let m = model(&[
            ("[UNK]", 0.0),
            ("\u{2581}ab", -9.0),
            ("\u{2581}a", -1.0),
            ("b", -1.0),
        ]);
        let tokens = m.tokenize("ab");
        let surfaces: Vec<&str> = tokens.iter().map(|t| t.surface.as_str()).collect();
        assert_eq!(surfaces, vec!["\u{2581}a", "b"]);
    }

    #[test]
    fn uncovered_characters_become_unk() {
        let m = model(&[("[UNK]", 0.0), ("\u{2581}a", -1.0)]);
        let tokens = m.tokenize("aqa");
        // "▁a" then 'q' (unk), then 'a' (unk, no "a" piece without marker)
        assert_eq!(tokens[0].surface, "\u{2581}a");
        assert_eq!(tokens[1].id, 0);
        assert_eq!(tokens[1].surface, "q");
        assert_eq!(tokens[2].id, 0);
    }

    #[test]
    fn specials_are_registered_and_looked_up() {
        let m = model(&[("[UNK]", 0.0)]);
        assert_eq!(m.special_id("[E]"), None);
        m.register_special("[E]", 57);
        assert_eq!(m.special_id("[E]"), Some(57));
        // Re-registration overwrites
        m.register_special("[E]", 58);
        assert_eq!(m.special_id("[E]"), Some(58));
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        let m = model(&[("[UNK]", 0.0)]);
        assert!(m.tokenize("").is_empty());
        assert!(m.tokenize("   ").is_empty());
    }

    #[test]
    fn repeated_calls_reuse_scratch() {
        let m = model(&[("[UNK]", 0.0), ("\u{2581}hi", -1.0)]);
        for _ in 0..100 {
            let tokens = m.tokenize("hi");
            assert_eq!(tokens.len(), 1);
        }
    }
}
