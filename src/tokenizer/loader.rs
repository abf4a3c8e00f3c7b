//! Tokenizer descriptor loading and the process-wide model cache.
//!
//! A tokenizer directory holds a Hugging Face style `tokenizer.json` (either
//! at the root or under a `tokenizer/` subdirectory) with a Unigram model:
//! `model.type = "unigram"`, a non-empty `model.vocab` of `[surface, score]`
//! pairs, `model.unk_id`, and optionally `added_tokens` carrying explicit
//! IDs. Loading a directory is expensive, so loaded models are memoised per
//! directory for the life of the process.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::unigram::UnigramModel;
use crate::{Error, Result};

/// Special tokens every loaded vocabulary must provide.
const REQUIRED_SPECIALS: [&str; 4] = ["[UNK]", "[PAD]", "[CLS]", "[SEP]"];

#[derive(Debug, Deserialize)]
struct RawTokenizer {
    #[serde(default)]
    added_tokens: Vec<RawAddedToken>,
    model: RawModel,
}

#[derive(Debug, Deserialize)]
struct RawAddedToken {
    id: u32,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(rename = "type")]
    model_type: String,
    unk_id: u32,
    vocab: Vec<(String, f32)>,
}

fn descriptor_path(dir: &Path) -> Result<PathBuf> {
    let nested = dir.join("tokenizer").join("tokenizer.json");
    if nested.is_file() {
        return Ok(nested);
    }
    let flat = dir.join("tokenizer.json");
    if flat.is_file() {
        return Ok(flat);
    }
    Err(Error::resource(format!(
        "no tokenizer.json under {}",
        dir.display()
    )))
}

/// Load a Unigram model from a tokenizer directory.
///
/// Fails with [`Error::Tokenizer`] for unsupported model types and with
/// [`Error::Resource`] when the descriptor or a required special token is
/// absent.
pub fn load_model(dir: impl AsRef<Path>) -> Result<Arc<UnigramModel>> {
    let dir = dir.as_ref();
    let path = descriptor_path(dir)?;
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::resource(format!("tokenizer {} unreadable: {e}", path.display())))?;
    let raw: RawTokenizer = serde_json::from_str(&content)
        .map_err(|e| Error::parse(format!("tokenizer {}: {e}", path.display())))?;

    if !raw.model.model_type.eq_ignore_ascii_case("unigram") {
        return Err(Error::tokenizer(format!(
            "unsupported tokenizer model type '{}' (expected unigram)",
            raw.model.model_type
        )));
    }
    if raw.model.vocab.is_empty() {
        return Err(Error::tokenizer(format!(
            "empty vocabulary in {}",
            path.display()
        )));
    }

    let vocab_index: HashMap<&str, u32> = raw
        .model
        .vocab
        .iter()
        .enumerate()
        .map(|(id, (surface, _))| (surface.as_str(), id as u32))
        .collect();

    let model = UnigramModel::new(raw.model.vocab.clone(), raw.model.unk_id)?;

    // Added tokens carry their own IDs and shadow vocabulary entries.
    let mut added: HashMap<&str, u32> = HashMap::new();
    for token in &raw.added_tokens {
        added.insert(token.content.as_str(), token.id);
        model.register_special(token.content.clone(), token.id);
    }

    for required in REQUIRED_SPECIALS {
        let id = added
            .get(required)
            .copied()
            .or_else(|| vocab_index.get(required).copied());
        match id {
            Some(id) => model.register_special(required, id),
            None => {
                return Err(Error::resource(format!(
                    "required special token {required} absent from {}",
                    path.display()
                )))
            }
        }
    }

    log::info!(
        "[Tokenizer] Loaded {} pieces (+{} added) from {}",
        vocab_index.len(),
        raw.added_tokens.len(),
        path.display()
    );

    Ok(Arc::new(model))
}

/// Load through the process-wide directory cache. Entries are built on first
/// use and never evicted.
pub fn load_model_cached(dir: impl AsRef<Path>) -> Result<Arc<UnigramModel>> {
    static CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<UnigramModel>>>> =
        Lazy::new(|| Mutex::new(HashMap::new()));

    let key = dir.as_ref().to_path_buf();
    let mut cache = CACHE
        .lock()
        .map_err(|_| Error::resource("tokenizer cache poisoned"))?;
    if let Some(model) = cache.get(&key) {
        return Ok(Arc::clone(model));
    }
    let model = load_model(&key)?;
    cache.insert(key, Arc::clone(&model));
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    pub(crate) fn fixture_json(model_type: &str) -> serde_json::Value {
        serde_json::json!({
            "added_tokens": [
                {"id": 200, "content": "[P]"},
                {"id": 201, "content": "[E]"}
            ],
            "model": {
                "type": model_type,
                "unk_id": 0,
                "vocab": [
                    ["[UNK]", 0.0],
                    ["[PAD]", 0.0],
                    ["[CLS]", 0.0],
                    ["[SEP]", 0.0],
                    ["\u{2581}hello", -2.0],
                    ["\u{2581}world", -2.5]
                ]
            }
        })
    }

    fn write_dir(value: &serde_json::Value, nested: bool) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let target = if nested {
            let sub = dir.path().join("tokenizer");
            fs::create_dir_all(&sub).unwrap();
            sub.join("tokenizer.json")
        } else {
            dir.path().join("tokenizer.json")
        };
        fs::write(target, serde_json::to_vec(value).unwrap()).unwrap();
        dir
    }

    #[test]
    fn loads_flat_and_nested_layouts() {
        for nested in [false, true] {
            let dir = write_dir(&fixture_json("unigram"), nested);
            let model = load_model(dir.path()).unwrap();
            assert_eq!(model.special_id("[CLS]"), Some(2));
            assert_eq!(model.special_id("[E]"), Some(201));
            assert_eq!(model.unk_id(), 0);
        }
    }

    #[test]
    fn accepts_capitalized_model_type() {
        let dir = write_dir(&fixture_json("Unigram"), false);
        assert!(load_model(dir.path()).is_ok());
    }

    #[test]
    fn rejects_bpe_model_type() {
        let dir = write_dir(&fixture_json("BPE"), false);
        let err = load_model(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Tokenizer(_)), "got {err:?}");
    }

    #[test]
    fn missing_required_special_is_a_resource_error() {
        let mut value = fixture_json("unigram");
        value["model"]["vocab"]
            .as_array_mut()
            .unwrap()
            .retain(|entry| entry[0] != "[CLS]");
        // Removing [CLS] shifts later IDs, but the check runs before that matters.
        let dir = write_dir(&value, false);
        let err = load_model(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Resource(_)), "got {err:?}");
    }

    #[test]
    fn missing_descriptor_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Resource(_)), "got {err:?}");
    }

    #[test]
    fn cache_returns_same_model() {
        let dir = write_dir(&fixture_json("unigram"), false);
        let first = load_model_cached(dir.path()).unwrap();
        let second = load_model_cached(dir.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
