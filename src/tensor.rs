//! Named tensor values exchanged with inference backends.
//!
//! Tensors are contiguous row-major buffers. `f32` is the working precision
//! throughout the pipeline; `f16` is accepted from backends that compile in
//! half precision and is widened at the adapter boundary; `i32` carries token
//! IDs, attention masks, and span indices.

use half::f16;
use ndarray::{ArrayD, IxDyn};
use std::collections::HashMap;

use crate::{Error, Result};

/// A named map of tensors, used for both backend inputs and outputs.
pub type TensorMap = HashMap<String, Tensor>;

/// A dense tensor of one of the three supported element types.
#[derive(Debug, Clone)]
pub enum Tensor {
    /// 32-bit float tensor (preferred).
    F32(ArrayD<f32>),
    /// 16-bit float tensor (acceptable for backend outputs).
    F16(ArrayD<f16>),
    /// 32-bit integer tensor (token IDs, masks, span indices).
    I32(ArrayD<i32>),
}

impl Tensor {
    /// Build an f32 tensor from a flat row-major buffer and shape.
    pub fn from_f32(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| Error::invalid_input(format!("f32 tensor shape: {e}")))?;
        Ok(Tensor::F32(array))
    }

    /// Build an i32 tensor from a flat row-major buffer and shape.
    pub fn from_i32(shape: &[usize], data: Vec<i32>) -> Result<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| Error::invalid_input(format!("i32 tensor shape: {e}")))?;
        Ok(Tensor::I32(array))
    }

    /// Tensor shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::F32(a) => a.shape(),
            Tensor::F16(a) => a.shape(),
            Tensor::I32(a) => a.shape(),
        }
    }

    /// Rank (number of dimensions).
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Element type name, for diagnostics.
    #[must_use]
    pub fn dtype(&self) -> &'static str {
        match self {
            Tensor::F32(_) => "float32",
            Tensor::F16(_) => "float16",
            Tensor::I32(_) => "int32",
        }
    }

    /// Consume the tensor as f32 data, widening `f16` outputs. Integer
    /// tensors are rejected rather than silently converted.
    pub fn into_f32(self) -> Result<ArrayD<f32>> {
        match self {
            Tensor::F32(a) => Ok(a),
            Tensor::F16(a) => Ok(a.mapv(f16::to_f32)),
            Tensor::I32(_) => Err(Error::invalid_output(
                "expected a floating-point tensor, got int32",
            )),
        }
    }
}

/// Pull one output tensor out of a backend result map.
///
/// Prefers `name`; if absent and the map holds exactly one tensor, that one
/// is taken (traced module outputs often carry generated names). Anything
/// else is an invalid output.
pub(crate) fn take_output(mut outputs: TensorMap, name: &str, stage: &'static str) -> Result<Tensor> {
    if let Some(tensor) = outputs.remove(name) {
        return Ok(tensor);
    }
    if outputs.len() == 1 {
        if let Some(tensor) = outputs.into_values().next() {
            return Ok(tensor);
        }
    }
    Err(Error::invalid_output(format!(
        "{stage}: output map has no feature named '{name}' (and is not single-valued)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f16_output_widens_to_f32() {
        let data: Vec<f16> = vec![f16::from_f32(0.5), f16::from_f32(-1.0)];
        let tensor = Tensor::F16(ArrayD::from_shape_vec(IxDyn(&[2]), data).unwrap());
        let widened = tensor.into_f32().unwrap();
        assert_eq!(widened.shape(), &[2]);
        assert!((widened[[0]] - 0.5).abs() < 1e-3);
        assert!((widened[[1]] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn int_tensor_is_not_a_float() {
        let tensor = Tensor::from_i32(&[2], vec![1, 2]).unwrap();
        assert!(tensor.into_f32().is_err());
    }

    #[test]
    fn take_output_prefers_named_feature() {
        let mut outputs = TensorMap::new();
        outputs.insert(
            "hidden_states".into(),
            Tensor::from_f32(&[1], vec![1.0]).unwrap(),
        );
        outputs.insert("aux".into(), Tensor::from_i32(&[1], vec![7]).unwrap());
        let taken = take_output(outputs, "hidden_states", "encoder").unwrap();
        assert_eq!(taken.dtype(), "float32");
    }

    #[test]
    fn take_output_accepts_single_unnamed_feature() {
        let mut outputs = TensorMap::new();
        outputs.insert("var_381".into(), Tensor::from_f32(&[1], vec![2.0]).unwrap());
        assert!(take_output(outputs, "hidden_states", "encoder").is_ok());
    }

    #[test]
    fn take_output_rejects_ambiguous_map() {
        let mut outputs = TensorMap::new();
        outputs.insert("a".into(), Tensor::from_f32(&[1], vec![1.0]).unwrap());
        outputs.insert("b".into(), Tensor::from_f32(&[1], vec![2.0]).unwrap());
        assert!(take_output(outputs, "hidden_states", "encoder").is_err());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        assert!(Tensor::from_f32(&[2, 2], vec![1.0, 2.0, 3.0]).is_err());
    }
}
