//! Orchestration of the four non-encoder heads for one encoded call.

use ndarray::{s, Array1, Array2, Array3, ArrayD, Axis};

use super::projector::{project, PromptEmbedding};
use crate::adapters::{
    ClassifierAdapter, CountEmbedAdapter, CountPredictorAdapter, SpanRepAdapter,
};
use crate::cancel::CancelToken;
use crate::tokenizer::{PromptKind, SchemaEncoding};
use crate::{Error, Result};

/// Everything the score builder and decoder need from one pipeline pass.
#[derive(Debug)]
pub struct SpanBundle {
    /// Span representations `[n_words, W, H]` (trimmed to the text length).
    pub span_emb: Array3<f32>,
    /// Span validity mask, `n_words * W` long.
    pub span_mask: Vec<f32>,
    /// Word embeddings `[n_words, H]`.
    pub word_emb: Array2<f32>,
    /// Label marker embeddings `[L, H]`.
    pub label_emb: Array2<f32>,
    /// The `[P]` prompt vector.
    pub prompt_emb: Array1<f32>,
    /// Raw classifier logits over the schema markers.
    pub classifier_logits: ArrayD<f32>,
    /// Raw count-predictor logits.
    pub count_logits: Vec<f32>,
    /// Structure embeddings `[predicted_count, L_cap, H]`; empty when the
    /// predicted count is zero.
    pub structure_emb: Array3<f32>,
    /// Predicted structure instance count, clamped to `[0, C_max]`.
    pub predicted_count: usize,
    /// The caller's labels, in order.
    pub labels: Vec<String>,
}

/// Orchestrates span-rep, classifier, count-predictor, and count-embed for
/// one encoded call. Immutable and shareable; the adapters serialise their
/// own backend access.
#[derive(Debug)]
pub struct SpanPipeline {
    span_rep: SpanRepAdapter,
    classifier: ClassifierAdapter,
    count_predictor: CountPredictorAdapter,
    count_embed: CountEmbedAdapter,
    max_seq_len: usize,
    max_width: usize,
    hidden_size: usize,
    max_count: usize,
}

impl SpanPipeline {
    /// Assemble the pipeline from its adapters and shape constants.
    pub fn new(
        span_rep: SpanRepAdapter,
        classifier: ClassifierAdapter,
        count_predictor: CountPredictorAdapter,
        count_embed: CountEmbedAdapter,
        max_seq_len: usize,
        max_width: usize,
        hidden_size: usize,
        max_count: usize,
    ) -> Self {
        Self {
            span_rep,
            classifier,
            count_predictor,
            count_embed,
            max_seq_len,
            max_width,
            hidden_size,
            max_count,
        }
    }

    /// Run projection and the four heads over one encoded call.
    pub fn run(
        &self,
        hidden: &Array2<f32>,
        encoding: &SchemaEncoding,
        cancel: &CancelToken,
    ) -> Result<SpanBundle> {
        let (word_emb, prompt_groups) = project(hidden, encoding)?;

        let num_words = encoding.text_words.len();
        let hidden_size = word_emb.ncols();
        if num_words > 0 && hidden_size != self.hidden_size {
            return Err(Error::invalid_input(format!(
                "embedding row width {hidden_size} does not match model hidden size {}",
                self.hidden_size
            )));
        }

        let (prompt_emb, label_emb, specials) =
            promote_specials(&prompt_groups, &encoding.entity_labels)?;

        // Pad word embeddings and span indices to the compiled capacity.
        let expected_pairs = num_words * self.max_width;
        if encoding.span_indices.len() != expected_pairs {
            return Err(Error::invalid_input(format!(
                "span index tensor has {} pairs, expected {expected_pairs}",
                encoding.span_indices.len()
            )));
        }
        let mut padded_words = Array2::<f32>::zeros((self.max_seq_len, self.hidden_size));
        let copy_rows = num_words.min(self.max_seq_len);
        padded_words
            .slice_mut(s![..copy_rows, ..])
            .assign(&word_emb.slice(s![..copy_rows, ..]));

        let mut padded_spans = vec![[0i32, 0i32]; self.max_seq_len * self.max_width];
        for (slot, pair) in encoding
            .span_indices
            .iter()
            .take(padded_spans.len())
            .enumerate()
        {
            padded_spans[slot] = [pair[0] as i32, pair[1] as i32];
        }

        cancel.checkpoint()?;
        let full_span_emb = self.span_rep.forward(&padded_words, &padded_spans)?;
        let span_emb = full_span_emb
            .slice(s![..copy_rows, .., ..])
            .to_owned();

        cancel.checkpoint()?;
        let classifier_logits = self.classifier.forward(&specials)?;

        cancel.checkpoint()?;
        let prompt_slice: Vec<f32> = prompt_emb.iter().copied().collect();
        let count_logits = self.count_predictor.forward(&prompt_slice)?;
        let predicted_count = argmax(&count_logits).min(self.max_count);

        cancel.checkpoint()?;
        let structure_emb = if predicted_count > 0 {
            let projected = self.count_embed.forward(&label_emb)?;
            let available = projected.len_of(Axis(0));
            if available < predicted_count {
                return Err(Error::invalid_output(format!(
                    "count_embed produced {available} instances, predicted {predicted_count}"
                )));
            }
            projected.slice(s![..predicted_count, .., ..]).to_owned()
        } else {
            log::debug!("[SpanPipeline] predicted count is 0, skipping count_embed");
            Array3::<f32>::zeros((0, encoding.entity_labels.len(), self.hidden_size))
        };

        Ok(SpanBundle {
            span_emb,
            span_mask: encoding.span_mask.clone(),
            word_emb,
            label_emb,
            prompt_emb,
            classifier_logits,
            count_logits,
            structure_emb,
            predicted_count,
            labels: encoding.entity_labels.clone(),
        })
    }
}

/// Extract the `[P]` prompt vector, the per-label `[E]` vectors, and the
/// ordered special matrix from the first schema group.
fn promote_specials(
    groups: &[Vec<PromptEmbedding>],
    labels: &[String],
) -> Result<(Array1<f32>, Array2<f32>, Array2<f32>)> {
    let group = groups
        .first()
        .filter(|group| !group.is_empty())
        .ok_or_else(|| Error::encoding("schema prompt has no marker embeddings"))?;

    let prompt = group
        .iter()
        .find(|embedding| embedding.kind == PromptKind::Prompt)
        .ok_or_else(|| Error::encoding("schema group has no [P] prompt vector"))?
        .vector
        .clone();

    let entity_vectors: Vec<&Array1<f32>> = group
        .iter()
        .filter(|embedding| embedding.kind == PromptKind::Entity)
        .map(|embedding| &embedding.vector)
        .collect();
    if entity_vectors.len() != labels.len() {
        return Err(Error::encoding(format!(
            "schema group has {} entity-class vectors for {} labels",
            entity_vectors.len(),
            labels.len()
        )));
    }

    let hidden_size = prompt.len();
    let mut label_emb = Array2::<f32>::zeros((entity_vectors.len(), hidden_size));
    for (row, vector) in entity_vectors.iter().copied().enumerate() {
        label_emb.row_mut(row).assign(vector);
    }

    let mut specials = Array2::<f32>::zeros((group.len(), hidden_size));
    for (row, embedding) in group.iter().enumerate() {
        specials.row_mut(row).assign(&embedding.vector);
    }

    Ok((prompt, label_emb, specials))
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_value = f32::NEG_INFINITY;
    for (index, &value) in values.iter().enumerate() {
        if value > best_value {
            best_value = value;
            best = index;
        }
    }
    best
}
