//! Top-level extraction handle.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::{
    ClassifierAdapter, CountEmbedAdapter, CountPredictorAdapter, EncoderAdapter, SpanRepAdapter,
};
use crate::backend::InferenceBackend;
use crate::cancel::CancelToken;
use crate::chunk::{merge_entities, Chunker};
use crate::config::ExtractorConfig;
use crate::entity::Entity;
use crate::manifest::Manifest;
use crate::metadata::SpanHeadMetadata;
use crate::pipeline::{build_scores, decode, SpanPipeline};
use crate::tokenizer::{self, Tokenizer};
use crate::{Error, Result};

/// Zero-shot entity extractor over a compiled GLiNER2 model.
///
/// The handle is immutable after construction and freely shareable across
/// threads; concurrent calls share the tokenizer and backends, and each
/// backend serialises its own predictions. Construction is the only blocking
/// initialisation point: it loads the manifest, tokenizer, and span-head
/// metadata, and compiles all five module artifacts.
pub struct Extractor {
    tokenizer: Tokenizer,
    encoder: EncoderAdapter,
    pipeline: SpanPipeline,
    chunker: Chunker,
    config: ExtractorConfig,
    manifest: Manifest,
    /// Span planning width: the width the span head was compiled for.
    plan_width: usize,
    /// Decoding width: candidate widths actually considered, never wider
    /// than `plan_width`.
    decode_width: usize,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("model_id", &self.manifest.model_id)
            .field("max_seq_len", &self.manifest.max_seq_len)
            .field("plan_width", &self.plan_width)
            .field("decode_width", &self.decode_width)
            .finish()
    }
}

impl Extractor {
    /// Load a model through `backend` using the default configuration.
    pub fn new(manifest_path: impl AsRef<Path>, backend: Arc<dyn InferenceBackend>) -> Result<Self> {
        Self::with_config(manifest_path, backend, ExtractorConfig::default())
    }

    /// Load a model with an explicit configuration.
    ///
    /// `config.max_sequence_length` must equal the manifest's compiled
    /// sequence capacity; a mismatch would desynchronise the padded tensors
    /// from the compiled module shapes, so it fails fast here.
    pub fn with_config(
        manifest_path: impl AsRef<Path>,
        backend: Arc<dyn InferenceBackend>,
        config: ExtractorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let manifest_path = manifest_path.as_ref();
        let manifest = Manifest::load(manifest_path)?;

        if config.max_sequence_length != manifest.max_seq_len {
            return Err(Error::invalid_input(format!(
                "max_sequence_length {} does not match the compiled capacity {}",
                config.max_sequence_length, manifest.max_seq_len
            )));
        }

        let metadata = SpanHeadMetadata::load_cached(manifest.base_dir.join("metadata.json"))?;
        if metadata.hidden_size != manifest.hidden_size {
            return Err(Error::parse(format!(
                "metadata hidden_size {} disagrees with manifest {}",
                metadata.hidden_size, manifest.hidden_size
            )));
        }

        let model = tokenizer::load_model_cached(&manifest.tokenizer_dir)?;
        let tokenizer = Tokenizer::new(model, manifest.max_seq_len, &metadata)?;

        // Span planning always uses the compiled width so the span-rep
        // tensors keep their shape contract; a smaller configured width only
        // narrows the candidate set during decoding.
        let plan_width = manifest.max_width;
        let decode_width = config.max_span_length.min(manifest.max_width);
        if config.max_span_length > manifest.max_width {
            log::warn!(
                "[Runtime] max_span_length {} capped to compiled width {}",
                config.max_span_length,
                manifest.max_width
            );
        }

        let encoder = EncoderAdapter::new(
            backend.compile(&manifest.encoder_path)?,
            manifest.hidden_size,
        );
        let pipeline = SpanPipeline::new(
            SpanRepAdapter::new(
                backend.compile(&manifest.span_rep_path)?,
                manifest.max_width,
                manifest.hidden_size,
            ),
            ClassifierAdapter::new(backend.compile(&manifest.classifier_path)?),
            CountPredictorAdapter::new(backend.compile(&manifest.count_predictor_path)?),
            CountEmbedAdapter::new(
                backend.compile(&manifest.count_embed_path)?,
                manifest.max_schema_tokens,
            ),
            manifest.max_seq_len,
            manifest.max_width,
            manifest.hidden_size,
            manifest.max_count,
        );

        let chunker = Chunker::new(&config.chunker)?;

        log::info!(
            "[Runtime] Ready: {} ({} labels capacity, width {})",
            manifest.model_id,
            manifest.max_schema_tokens,
            decode_width
        );

        Ok(Self {
            tokenizer,
            encoder,
            pipeline,
            chunker,
            config,
            manifest,
            plan_width,
            decode_width,
        })
    }

    /// The tokenizer bound to this model.
    #[must_use]
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// The loaded manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Extract entities for the given type labels.
    ///
    /// `threshold` overrides the configured sigmoid cutoff for this call.
    /// Empty text or an empty label list yields an empty result. Returned
    /// entities carry character offsets, are deduplicated, and come back
    /// ordered by start offset (ties by score).
    pub fn extract_entities(
        &self,
        text: &str,
        labels: &[&str],
        threshold: Option<f32>,
    ) -> Result<Vec<Entity>> {
        self.extract_entities_with_cancel(text, labels, threshold, &CancelToken::new())
    }

    /// [`Extractor::extract_entities`] with cooperative cancellation. The
    /// pipeline checks the token between stages and returns
    /// [`Error::Cancelled`] without emitting partial entities.
    pub fn extract_entities_with_cancel(
        &self,
        text: &str,
        labels: &[&str],
        threshold: Option<f32>,
        cancel: &CancelToken,
    ) -> Result<Vec<Entity>> {
        let threshold = threshold.unwrap_or(self.config.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::invalid_input(format!(
                "threshold must be in [0, 1], got {threshold}"
            )));
        }
        if text.trim().is_empty() || labels.is_empty() {
            return Ok(Vec::new());
        }
        // One [P] plus one [E] per label must fit the schema capacity.
        if labels.len() + 1 > self.manifest.max_schema_tokens {
            return Err(Error::invalid_input(format!(
                "{} labels exceed the schema capacity of {}",
                labels.len(),
                self.manifest.max_schema_tokens
            )));
        }

        let mut entities = if self.chunker.should_chunk(text) {
            let chunks = self.chunker.chunk(text);
            log::debug!("[Runtime] chunked input into {} windows", chunks.len());
            let mut collected = Vec::new();
            for chunk in &chunks {
                cancel.checkpoint()?;
                let chunk_entities =
                    self.extract_window(&chunk.text, labels, threshold, cancel)?;
                collected.extend(
                    chunk_entities
                        .into_iter()
                        .map(|entity| entity.offset_by(chunk.start)),
                );
            }
            merge_entities(collected)
        } else {
            self.extract_window(text, labels, threshold, cancel)?
        };

        entities.sort_by(|a, b| {
            a.start.cmp(&b.start).then_with(|| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        Ok(entities)
    }

    /// Extract entities for several texts with a shared label set. Texts run
    /// sequentially; the per-adapter queues serialise backend access anyway.
    pub fn extract_entities_batch(
        &self,
        texts: &[&str],
        labels: &[&str],
        threshold: Option<f32>,
    ) -> Result<Vec<Vec<Entity>>> {
        texts
            .iter()
            .map(|text| self.extract_entities(text, labels, threshold))
            .collect()
    }

    /// Run the full pipeline over one chunk-sized window.
    fn extract_window(
        &self,
        text: &str,
        labels: &[&str],
        threshold: f32,
        cancel: &CancelToken,
    ) -> Result<Vec<Entity>> {
        let encoding = self
            .tokenizer
            .encode_gliner2_schema(text, labels, self.plan_width)?;
        if encoding.text_words.is_empty() {
            return Ok(Vec::new());
        }

        cancel.checkpoint()?;
        let input_ids: Vec<i32> = encoding.input_ids.iter().map(|&id| id as i32).collect();
        let attention_mask: Vec<i32> =
            encoding.attention_mask.iter().map(|&m| m as i32).collect();
        let hidden = self.encoder.forward(&input_ids, &attention_mask)?;

        let bundle = self.pipeline.run(&hidden, &encoding, cancel)?;

        cancel.checkpoint()?;
        let scores = build_scores(&bundle);
        let scores = if self.decode_width < self.plan_width && scores.dim().0 > 0 {
            scores
                .slice(ndarray::s![.., ..self.decode_width, ..])
                .to_owned()
        } else {
            scores
        };
        Ok(decode(
            &scores,
            &bundle.labels,
            threshold,
            text,
            &encoding.text_words,
        ))
    }
}
