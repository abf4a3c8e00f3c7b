//! Span-head metadata loader.
//!
//! The exporter writes a `metadata.json` describing the span head's shape
//! constants and the special-token registrations the tokenizer must carry:
//! the base `[CLS]/[SEP]/[UNK]/[PAD]/[MASK]` equivalents plus the task
//! markers (`[P]`, `[E]`, the text separator, and the group separator).
//! Metadata is loaded once per path and cached for the life of the process.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{Error, Result};

/// Integer IDs for the tokens the tokenizer must register.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecialTokenIds {
    /// Prompt marker surface form (`[P]`).
    pub prompt_token: String,
    /// Prompt marker token ID.
    pub prompt_token_index: u32,
    /// Entity-class marker token ID (`[E]`).
    pub ent_token_index: u32,
    /// Task/text separator token ID.
    pub sep_token_index: u32,
    /// Schema group separator surface form (`[SEP_STRUCT]`).
    #[serde(default)]
    pub struct_token: Option<String>,
    /// Schema group separator token ID.
    #[serde(default)]
    pub struct_token_index: Option<u32>,
    /// `[CLS]` equivalent.
    pub cls_token_index: u32,
    /// Base `[SEP]` equivalent (sequence terminator).
    pub base_sep_token_index: u32,
    /// `[PAD]` equivalent.
    pub pad_token_index: u32,
    /// `[MASK]` equivalent.
    pub mask_token_index: u32,
    /// `[UNK]` equivalent.
    pub unk_token_index: u32,
}

/// Parsed span-head metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct SpanHeadMetadata {
    /// Hidden size the head was exported with. Must agree with the manifest.
    pub hidden_size: usize,
    /// Maximum span width in words.
    pub max_width: usize,
    /// Token ID of the entity-class marker.
    pub class_token_index: u32,
    /// Entity-class marker surface form (`[E]`).
    pub ent_token: String,
    /// Text separator surface form (`[SEP_TEXT]`).
    pub sep_token: String,
    /// Token registrations for the tokenizer.
    pub special_tokens: SpecialTokenIds,
}

impl SpanHeadMetadata {
    /// Parse a metadata file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::resource(format!("span-head metadata {} unreadable: {e}", path.display()))
        })?;
        let metadata: SpanHeadMetadata = serde_json::from_str(&content)
            .map_err(|e| Error::parse(format!("span-head metadata {}: {e}", path.display())))?;

        log::debug!(
            "[Metadata] ent_token={} sep_token={} class_token_index={}",
            metadata.ent_token,
            metadata.sep_token,
            metadata.class_token_index
        );

        Ok(metadata)
    }

    /// Load through the process-wide cache. The cache grows monotonically and
    /// is never evicted; it is a pure memoisation of disk contents.
    pub fn load_cached(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        static CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<SpanHeadMetadata>>>> =
            Lazy::new(|| Mutex::new(HashMap::new()));

        let path = path.as_ref().to_path_buf();
        let mut cache = CACHE
            .lock()
            .map_err(|_| Error::resource("span-head metadata cache poisoned"))?;
        if let Some(cached) = cache.get(&path) {
            return Ok(Arc::clone(cached));
        }
        let loaded = Arc::new(Self::load(&path)?);
        cache.insert(path, Arc::clone(&loaded));
        Ok(loaded)
    }

    /// The `(surface, id)` pairs the tokenizer must register after load.
    #[must_use]
    pub fn registrations(&self) -> Vec<(String, u32)> {
        let ids = &self.special_tokens;
        let mut pairs = vec![
            (self.ent_token.clone(), ids.ent_token_index),
            (self.sep_token.clone(), ids.sep_token_index),
            (ids.prompt_token.clone(), ids.prompt_token_index),
        ];
        if let (Some(token), Some(index)) = (&ids.struct_token, ids.struct_token_index) {
            pairs.push((token.clone(), index));
        }
        pairs
    }
}
