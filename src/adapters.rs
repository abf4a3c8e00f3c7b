//! Typed adapters over the five compiled modules.
//!
//! Each adapter owns one module handle and knows its shape contract:
//!
//! | Module          | Inputs                                        | Output            |
//! |-----------------|-----------------------------------------------|-------------------|
//! | encoder         | `input_ids [1,S]`, `attention_mask [1,S]`     | `[1,S,H]`         |
//! | span_rep        | `token_embeddings [1,S,H]`, `span_indices [1,S*W,2]` | `[1,S,W,H]` |
//! | classifier      | `schema_embeddings [P,H]`                     | `[P,...]` logits  |
//! | count_predictor | `prompt_embeddings [1,H]`                     | `[C_max+1]`       |
//! | count_embed     | `label_embeddings [P_cap,H]`                  | `[C_max,L_cap,H]` |
//!
//! Prediction calls are serialised per adapter behind a dedicated mutex so
//! engines that require serial access to a compiled model are satisfied; the
//! adapters themselves are freely shareable across threads. Half-precision
//! outputs are widened to `f32` here, and multi-dimensional outputs are
//! decoded into row-major arrays whose leading axis matches the contract.

use ndarray::{Array2, Array3, ArrayD, Ix2, Ix3};
use std::sync::{Arc, Mutex};

use crate::backend::CompiledModule;
use crate::tensor::{take_output, Tensor, TensorMap};
use crate::{Error, Result};

/// Shared plumbing: one module handle plus its serialisation queue.
struct ModuleQueue {
    module: Arc<dyn CompiledModule>,
    queue: Mutex<()>,
    stage: &'static str,
}

impl ModuleQueue {
    fn new(module: Arc<dyn CompiledModule>, stage: &'static str) -> Self {
        Self {
            module,
            queue: Mutex::new(()),
            stage,
        }
    }

    fn predict(&self, inputs: TensorMap, output_name: &str) -> Result<Tensor> {
        let outputs = {
            let _serial = self
                .queue
                .lock()
                .map_err(|_| Error::inference(self.stage, "prediction queue poisoned"))?;
            self.module
                .predict(&inputs)
                .map_err(|e| Error::inference(self.stage, e.to_string()))?
        };
        take_output(outputs, output_name, self.stage)
    }
}

impl std::fmt::Debug for ModuleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleQueue").field("stage", &self.stage).finish()
    }
}

fn expect_rank(array: &ArrayD<f32>, rank: usize, stage: &'static str) -> Result<()> {
    if array.ndim() != rank {
        return Err(Error::invalid_output(format!(
            "{stage}: expected rank-{rank} output, got shape {:?}",
            array.shape()
        )));
    }
    Ok(())
}

// =============================================================================
// Encoder
// =============================================================================

/// Adapter for the transformer encoder module.
#[derive(Debug)]
pub struct EncoderAdapter {
    inner: ModuleQueue,
    hidden_size: usize,
}

impl EncoderAdapter {
    /// Wrap a compiled encoder.
    pub fn new(module: Arc<dyn CompiledModule>, hidden_size: usize) -> Self {
        Self {
            inner: ModuleQueue::new(module, "encoder"),
            hidden_size,
        }
    }

    /// Run the encoder over one sequence. Returns hidden states `[S, H]`.
    pub fn forward(&self, input_ids: &[i32], attention_mask: &[i32]) -> Result<Array2<f32>> {
        if input_ids.len() != attention_mask.len() {
            return Err(Error::encoding(format!(
                "input_ids ({}) and attention_mask ({}) length mismatch",
                input_ids.len(),
                attention_mask.len()
            )));
        }
        let seq_len = input_ids.len();
        let mut inputs = TensorMap::new();
        inputs.insert(
            "input_ids".into(),
            Tensor::from_i32(&[1, seq_len], input_ids.to_vec())?,
        );
        inputs.insert(
            "attention_mask".into(),
            Tensor::from_i32(&[1, seq_len], attention_mask.to_vec())?,
        );

        let hidden = self.inner.predict(inputs, "hidden_states")?.into_f32()?;
        expect_rank(&hidden, 3, "encoder")?;
        let shape = hidden.shape().to_vec();
        if shape[0] != 1 || shape[1] != seq_len || shape[2] != self.hidden_size {
            return Err(Error::invalid_output(format!(
                "encoder: expected [1, {seq_len}, {}], got {shape:?}",
                self.hidden_size
            )));
        }
        hidden
            .into_shape_with_order((shape[1], shape[2]))
            .map_err(|e| Error::invalid_output(format!("encoder reshape: {e}")))?
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::invalid_output(format!("encoder dims: {e}")))
    }
}

// =============================================================================
// Span representation head
// =============================================================================

/// Adapter for the span representation head.
#[derive(Debug)]
pub struct SpanRepAdapter {
    inner: ModuleQueue,
    max_width: usize,
    hidden_size: usize,
}

impl SpanRepAdapter {
    /// Wrap a compiled span-rep head.
    pub fn new(module: Arc<dyn CompiledModule>, max_width: usize, hidden_size: usize) -> Self {
        Self {
            inner: ModuleQueue::new(module, "span_rep"),
            max_width,
            hidden_size,
        }
    }

    /// Compute span representations.
    ///
    /// `token_embeddings` must be `[S, H]` (already padded to the compiled
    /// capacity) and `span_indices` a flat list of `S * W` index pairs.
    /// Returns `[S, W, H]`.
    pub fn forward(
        &self,
        token_embeddings: &Array2<f32>,
        span_indices: &[[i32; 2]],
    ) -> Result<Array3<f32>> {
        let (seq_len, hidden) = token_embeddings.dim();
        if hidden != self.hidden_size {
            return Err(Error::invalid_input(format!(
                "span_rep: embedding row width {hidden} != hidden size {}",
                self.hidden_size
            )));
        }
        let expected_spans = seq_len * self.max_width;
        if span_indices.len() != expected_spans {
            return Err(Error::invalid_input(format!(
                "span_rep: expected {expected_spans} span index pairs, got {}",
                span_indices.len()
            )));
        }

        let mut flat_indices = Vec::with_capacity(expected_spans * 2);
        for pair in span_indices {
            flat_indices.push(pair[0]);
            flat_indices.push(pair[1]);
        }

        let mut inputs = TensorMap::new();
        inputs.insert(
            "token_embeddings".into(),
            Tensor::from_f32(
                &[1, seq_len, hidden],
                token_embeddings.iter().copied().collect(),
            )?,
        );
        inputs.insert(
            "span_indices".into(),
            Tensor::from_i32(&[1, expected_spans, 2], flat_indices)?,
        );

        let output = self.inner.predict(inputs, "span_rep")?.into_f32()?;
        expect_rank(&output, 4, "span_rep")?;
        let shape = output.shape().to_vec();
        if shape[0] != 1 || shape[1] != seq_len || shape[2] != self.max_width || shape[3] != hidden
        {
            return Err(Error::invalid_output(format!(
                "span_rep: expected [1, {seq_len}, {}, {hidden}], got {shape:?}",
                self.max_width
            )));
        }
        output
            .into_shape_with_order((shape[1], shape[2], shape[3]))
            .map_err(|e| Error::invalid_output(format!("span_rep reshape: {e}")))?
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::invalid_output(format!("span_rep dims: {e}")))
    }
}

// =============================================================================
// Classifier head
// =============================================================================

/// Adapter for the classification head.
#[derive(Debug)]
pub struct ClassifierAdapter {
    inner: ModuleQueue,
}

impl ClassifierAdapter {
    /// Wrap a compiled classifier head.
    pub fn new(module: Arc<dyn CompiledModule>) -> Self {
        Self {
            inner: ModuleQueue::new(module, "classifier"),
        }
    }

    /// Project schema marker embeddings `[P, H]` to logits `[P, ...]`.
    pub fn forward(&self, schema_embeddings: &Array2<f32>) -> Result<ArrayD<f32>> {
        let (rows, hidden) = schema_embeddings.dim();
        let mut inputs = TensorMap::new();
        inputs.insert(
            "schema_embeddings".into(),
            Tensor::from_f32(&[rows, hidden], schema_embeddings.iter().copied().collect())?,
        );

        let logits = self.inner.predict(inputs, "logits")?.into_f32()?;
        if logits.ndim() == 0 || logits.shape()[0] != rows {
            return Err(Error::invalid_output(format!(
                "classifier: leading axis must be {rows}, got shape {:?}",
                logits.shape()
            )));
        }
        Ok(logits)
    }
}

// =============================================================================
// Count predictor head
// =============================================================================

/// Adapter for the structure count predictor.
#[derive(Debug)]
pub struct CountPredictorAdapter {
    inner: ModuleQueue,
}

impl CountPredictorAdapter {
    /// Wrap a compiled count predictor.
    pub fn new(module: Arc<dyn CompiledModule>) -> Self {
        Self {
            inner: ModuleQueue::new(module, "count_predictor"),
        }
    }

    /// Predict count logits from the `[P]` prompt vector. The output is
    /// flattened; shape variations across exports ([C+1] vs. [1, C+1]) are
    /// tolerated.
    pub fn forward(&self, prompt_embedding: &[f32]) -> Result<Vec<f32>> {
        let hidden = prompt_embedding.len();
        let mut inputs = TensorMap::new();
        inputs.insert(
            "prompt_embeddings".into(),
            Tensor::from_f32(&[1, hidden], prompt_embedding.to_vec())?,
        );

        let logits = self.inner.predict(inputs, "count_logits")?.into_f32()?;
        if logits.is_empty() {
            return Err(Error::invalid_output("count_predictor: empty logit tensor"));
        }
        Ok(logits.iter().copied().collect())
    }
}

// =============================================================================
// Count embedding head
// =============================================================================

/// Adapter for the count-aware label projection head.
#[derive(Debug)]
pub struct CountEmbedAdapter {
    inner: ModuleQueue,
    schema_capacity: usize,
}

impl CountEmbedAdapter {
    /// Wrap a compiled count-embed head. `schema_capacity` is the prompt
    /// capacity (`P_max`) the module was compiled for.
    pub fn new(module: Arc<dyn CompiledModule>, schema_capacity: usize) -> Self {
        Self {
            inner: ModuleQueue::new(module, "count_embed"),
            schema_capacity,
        }
    }

    /// Project label embeddings `[L, H]` into per-instance structure
    /// embeddings `[C_max, L_cap, H]`.
    ///
    /// Rows are zero-padded up to the compiled schema capacity before the
    /// call. Only the first `L` rows of each output slice carry meaning; the
    /// rest of the padded axis is unspecified.
    pub fn forward(&self, label_embeddings: &Array2<f32>) -> Result<Array3<f32>> {
        let (labels, hidden) = label_embeddings.dim();
        if labels > self.schema_capacity {
            return Err(Error::invalid_input(format!(
                "count_embed: {labels} labels exceed schema capacity {}",
                self.schema_capacity
            )));
        }

        let mut padded = vec![0.0f32; self.schema_capacity * hidden];
        for (row, embedding) in label_embeddings.rows().into_iter().enumerate() {
            let offset = row * hidden;
            for (col, value) in embedding.iter().enumerate() {
                padded[offset + col] = *value;
            }
        }

        let mut inputs = TensorMap::new();
        inputs.insert(
            "label_embeddings".into(),
            Tensor::from_f32(&[self.schema_capacity, hidden], padded)?,
        );

        let output = self
            .inner
            .predict(inputs, "structure_embeddings")?
            .into_f32()?;
        expect_rank(&output, 3, "count_embed")?;
        let shape = output.shape().to_vec();
        if shape[2] != hidden {
            return Err(Error::invalid_output(format!(
                "count_embed: hidden axis must be {hidden}, got shape {shape:?}"
            )));
        }
        output
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::invalid_output(format!("count_embed dims: {e}")))
    }
}
