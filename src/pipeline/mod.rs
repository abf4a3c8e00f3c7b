//! The GLiNER2 inference pipeline: projection, head orchestration, scoring,
//! and decoding.
//!
//! ```text
//!  encoder hidden states ──▶ projector ──▶ span pipeline ──▶ scorer ──▶ decoder
//!       [T, H]                word/prompt     4 heads        [w,W,L]    entities
//! ```
//!
//! Stages run sequentially; each consumes the previous stage's tensors. The
//! only internal parallelism lives inside the neural backend.

pub mod decoder;
pub mod projector;
pub mod scorer;
pub mod span;

pub use decoder::decode;
pub use projector::{project, PromptEmbedding};
pub use scorer::build_scores;
pub use span::{SpanBundle, SpanPipeline};
