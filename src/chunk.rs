//! Long-text chunking and cross-chunk entity merging.
//!
//! Inputs whose word count exceeds the chunker's budget are partitioned into
//! overlapping character windows before tokenization. Windows prefer to end
//! at a newline, then at any whitespace, then at the hard character
//! boundary; a chunk that still holds too many words is shrunk backwards
//! whitespace by whitespace. The cursor advances by `end - overlap_chars`,
//! clamped so progress is always made.

use crate::config::ChunkerConfig;
use crate::entity::Entity;
use crate::{Error, Result};

/// A character-bounded slice of the original input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk text, trimmed of surrounding whitespace.
    pub text: String,
    /// Start character offset in the original input (inclusive).
    pub start: u32,
    /// End character offset in the original input (exclusive).
    pub end: u32,
}

/// Splits long inputs into overlapping windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
    max_words: usize,
}

/// Whitespace-separated word count, used for all chunk budgeting.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

impl Chunker {
    /// Build a chunker, validating the window bounds.
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        if config.max_chars < 256 {
            return Err(Error::invalid_input(format!(
                "chunker max_chars must be at least 256, got {}",
                config.max_chars
            )));
        }
        Ok(Self {
            max_chars: config.max_chars,
            overlap_chars: config.overlap_chars,
            max_words: config.max_words,
        })
    }

    /// Whether the text needs chunking at all.
    #[must_use]
    pub fn should_chunk(&self, text: &str) -> bool {
        word_count(text) > self.max_words
    }

    /// Partition text into non-empty overlapping chunks.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut cursor = 0usize;

        while cursor < total {
            let hard_end = (cursor + self.max_chars).min(total);
            let mut end = hard_end;

            if hard_end < total {
                let window = &chars[cursor..hard_end];
                if let Some(pos) = window.iter().rposition(|&c| c == '\n') {
                    end = cursor + pos + 1;
                } else if let Some(pos) = window.iter().rposition(|c| c.is_whitespace()) {
                    end = cursor + pos + 1;
                }
            }

            // Trim surrounding whitespace inside the window.
            let mut start = cursor;
            while start < end && chars[start].is_whitespace() {
                start += 1;
            }
            let mut trimmed_end = end;
            while trimmed_end > start && chars[trimmed_end - 1].is_whitespace() {
                trimmed_end -= 1;
            }

            let mut boundary = end;
            let mut anchor = cursor;
            if start < trimmed_end {
                anchor = start;
                // Shrink until the word budget holds.
                loop {
                    let candidate: String = chars[start..trimmed_end].iter().collect();
                    if word_count(&candidate) <= self.max_words {
                        chunks.push(TextChunk {
                            text: candidate,
                            start: start as u32,
                            end: trimmed_end as u32,
                        });
                        boundary = trimmed_end;
                        break;
                    }
                    let retreat = chars[start..trimmed_end]
                        .iter()
                        .rposition(|c| c.is_whitespace());
                    let Some(pos) = retreat else {
                        // A single unbreakable run; emit it rather than loop.
                        chunks.push(TextChunk {
                            text: candidate,
                            start: start as u32,
                            end: trimmed_end as u32,
                        });
                        boundary = trimmed_end;
                        break;
                    };
                    trimmed_end = start + pos;
                    while trimmed_end > start && chars[trimmed_end - 1].is_whitespace() {
                        trimmed_end -= 1;
                    }
                    if trimmed_end == start {
                        break;
                    }
                }
            }

            // Advance, clamped past the emitted chunk's start so the cursor
            // always moves forward and never re-emits the same window.
            let mut next = boundary.saturating_sub(self.overlap_chars);
            if next <= anchor {
                next = boundary.max(anchor + 1);
            }
            cursor = next;
        }

        chunks
    }
}

/// Merge entities collected across chunks.
///
/// Entities arrive with document-level offsets. They are ranked by score
/// descending and deduplicated: two entities are duplicates iff they carry
/// the same label and either their texts match case-insensitively or their
/// character ranges overlap. The higher-scoring copy survives. The result
/// stays in score-descending order; callers re-sort for positional output.
#[must_use]
pub fn merge_entities(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Entity> = Vec::with_capacity(entities.len());
    for entity in entities {
        let lowered = entity.text.to_lowercase();
        let duplicate = kept.iter().any(|existing| {
            existing.label == entity.label
                && (existing.text.to_lowercase() == lowered || existing.overlaps(&entity))
        });
        if !duplicate {
            kept.push(entity);
        }
    }
    kept
}
