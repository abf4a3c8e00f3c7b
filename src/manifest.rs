//! Export manifest loader.
//!
//! The offline exporter writes an `export_manifest.json` next to the compiled
//! module packages. The manifest names the five artifacts, the tokenizer
//! directory, and the shape constants every downstream stage depends on.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Paths to the five compiled module artifacts, relative to the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactPaths {
    /// Transformer encoder package.
    pub encoder: String,
    /// Span representation head.
    pub span_rep: String,
    /// Classification head.
    pub classifier: String,
    /// Structure count predictor.
    pub count_predictor: String,
    /// Count-aware label projection head.
    pub count_embed: String,
}

/// Parsed export manifest.
///
/// All relative paths have been resolved against the manifest's directory by
/// the time a `Manifest` value exists.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Source model identifier (e.g. a Hugging Face repo id).
    pub model_id: String,
    /// Maximum subword sequence length the encoder was compiled for.
    pub max_seq_len: usize,
    /// Maximum schema prompt capacity in tokens.
    pub max_schema_tokens: usize,
    /// Maximum span width in words.
    pub max_width: usize,
    /// Encoder hidden size.
    pub hidden_size: usize,
    /// Index of the counting layer in the source model.
    pub counting_layer: usize,
    /// Maximum structure instance count.
    pub max_count: usize,
    /// Weight precision of the exported packages ("fp16" or "fp32").
    pub precision: String,
    /// Resolved artifact paths.
    pub encoder_path: PathBuf,
    /// Resolved span-rep path.
    pub span_rep_path: PathBuf,
    /// Resolved classifier path.
    pub classifier_path: PathBuf,
    /// Resolved count-predictor path.
    pub count_predictor_path: PathBuf,
    /// Resolved count-embed path.
    pub count_embed_path: PathBuf,
    /// Resolved tokenizer directory.
    pub tokenizer_dir: PathBuf,
    /// Directory the manifest was loaded from.
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    model_id: String,
    max_seq_len: usize,
    max_schema_tokens: usize,
    max_width: usize,
    hidden_size: usize,
    #[serde(default)]
    counting_layer: usize,
    #[serde(default = "default_max_count")]
    max_count: usize,
    #[serde(default = "default_precision")]
    precision: String,
    artifacts: ArtifactPaths,
    tokenizer_dir: Option<String>,
}

fn default_max_count() -> usize {
    20
}

fn default_precision() -> String {
    "fp16".to_string()
}

impl Manifest {
    /// Load and validate a manifest file.
    ///
    /// Relative artifact and tokenizer paths are resolved against the
    /// manifest's directory. Missing artifact files or a missing tokenizer
    /// directory fail with [`Error::Resource`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::resource(format!("manifest {} unreadable: {e}", path.display()))
        })?;
        let raw: RawManifest = serde_json::from_str(&content)
            .map_err(|e| Error::parse(format!("manifest {}: {e}", path.display())))?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let resolve = |relative: &str| -> Result<PathBuf> {
            let candidate = if Path::new(relative).is_absolute() {
                PathBuf::from(relative)
            } else {
                base_dir.join(relative)
            };
            if !candidate.exists() {
                return Err(Error::resource(format!(
                    "artifact not found: {}",
                    candidate.display()
                )));
            }
            Ok(candidate)
        };

        let tokenizer_rel = raw
            .tokenizer_dir
            .as_deref()
            .ok_or_else(|| Error::resource("manifest has no tokenizer_dir entry"))?;
        let tokenizer_dir = resolve(tokenizer_rel)?;
        if !tokenizer_dir.is_dir() {
            return Err(Error::resource(format!(
                "tokenizer_dir is not a directory: {}",
                tokenizer_dir.display()
            )));
        }

        let manifest = Self {
            model_id: raw.model_id,
            max_seq_len: raw.max_seq_len,
            max_schema_tokens: raw.max_schema_tokens,
            max_width: raw.max_width,
            hidden_size: raw.hidden_size,
            counting_layer: raw.counting_layer,
            max_count: raw.max_count,
            precision: raw.precision,
            encoder_path: resolve(&raw.artifacts.encoder)?,
            span_rep_path: resolve(&raw.artifacts.span_rep)?,
            classifier_path: resolve(&raw.artifacts.classifier)?,
            count_predictor_path: resolve(&raw.artifacts.count_predictor)?,
            count_embed_path: resolve(&raw.artifacts.count_embed)?,
            tokenizer_dir,
            base_dir,
        };

        if manifest.max_seq_len < 2 || manifest.max_width == 0 || manifest.hidden_size == 0 {
            return Err(Error::parse(format!(
                "manifest has degenerate shape constants (max_seq_len={}, max_width={}, hidden_size={})",
                manifest.max_seq_len, manifest.max_width, manifest.hidden_size
            )));
        }

        log::info!(
            "[Manifest] Loaded {} (H={}, S_max={}, W={}, C_max={}, {})",
            manifest.model_id,
            manifest.hidden_size,
            manifest.max_seq_len,
            manifest.max_width,
            manifest.max_count,
            manifest.precision,
        );

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(dir: &Path, tokenizer: bool) -> PathBuf {
        for name in [
            "Encoder.mlpackage",
            "SpanRep.mlpackage",
            "Classifier.mlpackage",
            "CountPredictor.mlpackage",
            "CountEmbed.mlpackage",
        ] {
            fs::write(dir.join(name), b"").unwrap();
        }
        if tokenizer {
            fs::create_dir_all(dir.join("tokenizer")).unwrap();
        }
        let manifest = serde_json::json!({
            "model_id": "fastino/gliner2-base-v1",
            "max_seq_len": 384,
            "max_schema_tokens": 64,
            "max_width": 8,
            "hidden_size": 768,
            "counting_layer": 6,
            "max_count": 20,
            "precision": "fp16",
            "artifacts": {
                "encoder": "Encoder.mlpackage",
                "span_rep": "SpanRep.mlpackage",
                "classifier": "Classifier.mlpackage",
                "count_predictor": "CountPredictor.mlpackage",
                "count_embed": "CountEmbed.mlpackage"
            },
            "tokenizer_dir": "tokenizer"
        });
        let path = dir.join("export_manifest.json");
        fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
        path
    }

    #[test]
    fn loads_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), true);
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.model_id, "fastino/gliner2-base-v1");
        assert_eq!(manifest.hidden_size, 768);
        assert!(manifest.encoder_path.ends_with("Encoder.mlpackage"));
        assert!(manifest.encoder_path.is_absolute() || manifest.encoder_path.exists());
        assert!(manifest.tokenizer_dir.is_dir());
    }

    #[test]
    fn missing_artifact_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), true);
        fs::remove_file(dir.path().join("SpanRep.mlpackage")).unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, Error::Resource(_)), "got {err:?}");
    }

    #[test]
    fn missing_tokenizer_dir_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), false);
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, Error::Resource(_)), "got {err:?}");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export_manifest.json");
        fs::write(&path, b"{not json").unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "got {err:?}");
    }
}
