//! Subword tokenization and prompt construction.
//!
//! The tokenizer owns three encode paths:
//!
//! - [`Tokenizer::encode`]: plain `[CLS] ... [SEP]` encoding with optional
//!   padding, for callers that drive the encoder directly.
//! - [`Tokenizer::encode_prompted`]: the legacy entity prompt
//!   (`[E] label ... [SEP] words`) with per-word masking.
//! - [`Tokenizer::encode_gliner2_schema`]: the full GLiNER2 schema prompt
//!   with subword mappings, prompt locations, and span planning (see
//!   [`schema`]).
//!
//! The underlying Unigram model is shared and immutable; special-token
//! registration is the only mutation point and is internally locked.

pub mod loader;
pub mod schema;
pub mod unigram;

pub use loader::{load_model, load_model_cached};
pub use schema::{
    split_words, PromptKind, PromptLocation, SchemaEncoding, Segment, SubwordMapping, Word,
};
pub use unigram::{SubwordToken, UnigramModel, CONTINUATION_MARKER};

use std::sync::Arc;

use crate::metadata::SpanHeadMetadata;
use crate::{Error, Result};

/// Output of [`Tokenizer::encode`].
#[derive(Debug, Clone)]
pub struct TokenizedInput {
    /// Token IDs, `[CLS] ... [SEP]` plus optional padding.
    pub input_ids: Vec<u32>,
    /// Attention mask: 1 for real tokens, 0 for padding.
    pub attention_mask: Vec<u32>,
    /// Token surface forms, aligned with `input_ids`.
    pub tokens: Vec<String>,
}

/// Output of [`Tokenizer::encode_prompted`].
#[derive(Debug, Clone)]
pub struct PromptedEncoding {
    /// Token IDs for the full prompt.
    pub input_ids: Vec<u32>,
    /// Attention mask, aligned with `input_ids`.
    pub attention_mask: Vec<u32>,
    /// 1-based word index at the first piece of each text word, 0 elsewhere.
    pub word_mask: Vec<u32>,
    /// Character range of each text word in the original input.
    pub word_ranges: Vec<(u32, u32)>,
    /// Subword indices of the entity markers, one per label.
    pub ent_positions: Vec<usize>,
}

/// Tokenizer bound to a loaded model, a sequence budget, and the model's
/// marker tokens.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    model: Arc<UnigramModel>,
    max_length: usize,
    prompt_token: String,
    ent_token: String,
    sep_token: String,
    struct_token: Option<String>,
}

impl Tokenizer {
    /// Bind a loaded model. Registers the metadata's marker tokens (and the
    /// `[MASK]` equivalent) on the shared model.
    pub fn new(
        model: Arc<UnigramModel>,
        max_length: usize,
        metadata: &SpanHeadMetadata,
    ) -> Result<Self> {
        for (surface, id) in metadata.registrations() {
            model.register_special(surface, id);
        }
        model.register_special("[MASK]", metadata.special_tokens.mask_token_index);

        Ok(Self {
            model,
            max_length,
            prompt_token: metadata.special_tokens.prompt_token.clone(),
            ent_token: metadata.ent_token.clone(),
            sep_token: metadata.sep_token.clone(),
            struct_token: metadata.special_tokens.struct_token.clone(),
        })
    }

    /// The configured maximum subword sequence length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// The shared Unigram model.
    #[must_use]
    pub fn model(&self) -> &Arc<UnigramModel> {
        &self.model
    }

    /// Register an additional special token on the shared model.
    pub fn register_special(&self, surface: impl Into<String>, id: u32) {
        self.model.register_special(surface, id);
    }

    pub(crate) fn special(&self, surface: &str) -> Result<u32> {
        self.model
            .special_id(surface)
            .ok_or_else(|| Error::tokenizer(format!("unknown special token {surface}")))
    }

    /// The task prompt marker surface form (`[P]`).
    #[must_use]
    pub fn prompt_token(&self) -> &str {
        &self.prompt_token
    }

    /// The entity-class marker surface form (`[E]`).
    #[must_use]
    pub fn ent_token(&self) -> &str {
        &self.ent_token
    }

    /// The task/text separator marker surface form.
    #[must_use]
    pub fn sep_token(&self) -> &str {
        &self.sep_token
    }

    /// The schema group separator surface form, when the model declares one.
    #[must_use]
    pub fn struct_token(&self) -> Option<&str> {
        self.struct_token.as_deref()
    }

    /// Encode plain text as `[CLS] pieces ... [SEP]`, truncating to the
    /// sequence budget and optionally padding up to it.
    pub fn encode(&self, text: &str, pad_to_max: bool) -> Result<TokenizedInput> {
        if self.max_length < 2 {
            return Err(Error::tokenizer(format!(
                "max length {} leaves no room for [CLS]/[SEP]",
                self.max_length
            )));
        }
        let cls = self.special("[CLS]")?;
        let sep = self.special("[SEP]")?;
        let pad = self.special("[PAD]")?;

        let mut pieces = self.model.tokenize(text);
        pieces.truncate(self.max_length - 2);

        let mut input_ids = Vec::with_capacity(pieces.len() + 2);
        let mut tokens = Vec::with_capacity(pieces.len() + 2);
        input_ids.push(cls);
        tokens.push("[CLS]".to_string());
        for piece in pieces {
            input_ids.push(piece.id);
            tokens.push(piece.surface);
        }
        input_ids.push(sep);
        tokens.push("[SEP]".to_string());

        let mut attention_mask = vec![1u32; input_ids.len()];
        if pad_to_max {
            while input_ids.len() < self.max_length {
                input_ids.push(pad);
                attention_mask.push(0);
                tokens.push("[PAD]".to_string());
            }
        }

        Ok(TokenizedInput {
            input_ids,
            attention_mask,
            tokens,
        })
    }

    /// Encode the legacy entity prompt: `[CLS] [E] label1 [E] label2 ...
    /// [SEP*] word1 word2 ... [SEP]`, where `[SEP*]` is the model's task
    /// separator marker. Tracks the 1-based word index at the first piece of
    /// each text word and the subword index of each entity marker.
    pub fn encode_prompted(
        &self,
        text: &str,
        labels: &[&str],
        pad_to_max: bool,
    ) -> Result<PromptedEncoding> {
        if self.max_length < 2 {
            return Err(Error::tokenizer(format!(
                "max length {} leaves no room for [CLS]/[SEP]",
                self.max_length
            )));
        }
        let cls = self.special("[CLS]")?;
        let sep = self.special("[SEP]")?;
        let pad = self.special("[PAD]")?;
        let ent = self.special(&self.ent_token)?;
        let task_sep = self.special(&self.sep_token)?;

        let mut input_ids = Vec::new();
        let mut word_mask = Vec::new();
        let mut ent_positions = Vec::new();

        input_ids.push(cls);
        word_mask.push(0);

        for label in labels {
            ent_positions.push(input_ids.len());
            input_ids.push(ent);
            word_mask.push(0);
            for piece in self.model.tokenize(label) {
                input_ids.push(piece.id);
                word_mask.push(0);
            }
        }

        input_ids.push(task_sep);
        word_mask.push(0);

        let words = split_words(text);
        let mut word_ranges = Vec::with_capacity(words.len());
        for (word_idx, word) in words.iter().enumerate() {
            word_ranges.push((word.start, word.end));
            for (piece_idx, piece) in self.model.tokenize(&word.text).into_iter().enumerate() {
                input_ids.push(piece.id);
                word_mask.push(if piece_idx == 0 { word_idx as u32 + 1 } else { 0 });
            }
        }

        input_ids.push(sep);
        word_mask.push(0);

        if input_ids.len() > self.max_length {
            return Err(Error::tokenizer(format!(
                "prompted encoding of {} subwords exceeds max length {}",
                input_ids.len(),
                self.max_length
            )));
        }

        let mut attention_mask = vec![1u32; input_ids.len()];
        if pad_to_max {
            while input_ids.len() < self.max_length {
                input_ids.push(pad);
                attention_mask.push(0);
                word_mask.push(0);
            }
        }

        Ok(PromptedEncoding {
            input_ids,
            attention_mask,
            word_mask,
            word_ranges,
            ent_positions,
        })
    }
}
