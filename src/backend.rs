//! Abstract inference backend interface.
//!
//! The runtime never talks to a neural engine directly. A backend compiles an
//! on-disk artifact into an opaque module handle once, and the handle answers
//! named-tensor prediction requests for the rest of the process lifetime.
//! Concrete implementations (Core ML, ONNX Runtime, a test double) live
//! outside this crate.

use std::path::Path;
use std::sync::Arc;

use crate::tensor::TensorMap;
use crate::Result;

/// A compiled neural module ready for prediction.
///
/// Implementations may or may not be internally thread-safe; the runtime's
/// adapters serialise calls per module, so `predict` is never invoked
/// concurrently on the same handle through this crate.
pub trait CompiledModule: Send + Sync {
    /// Run one prediction. Inputs and outputs are maps of named tensors.
    fn predict(&self, inputs: &TensorMap) -> Result<TensorMap>;
}

/// Factory for compiled modules.
///
/// `compile` is called once per artifact at extractor construction; engines
/// that cache compiled binaries (Core ML style) should do so behind this
/// call. The runtime never recompiles per prediction.
pub trait InferenceBackend: Send + Sync {
    /// Compile the artifact at `path` into a prediction handle.
    fn compile(&self, path: &Path) -> Result<Arc<dyn CompiledModule>>;
}
