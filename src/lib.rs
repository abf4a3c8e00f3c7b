//! # gliner2-runtime
//!
//! On-device zero-shot named-entity recognition for the GLiNER2 model
//! family. Given a passage of text and a list of entity *type labels*
//! ("person", "company", ...), the runtime returns character-offset spans
//! labelled with one of those types and a confidence score, without any
//! retraining.
//!
//! The crate implements the full GLiNER2 inference pipeline:
//!
//! - Schema/prompt construction and SentencePiece Unigram tokenization
//!   (Viterbi decoding, special-token registry)
//! - Orchestration of a transformer encoder plus the span-rep, classifier,
//!   count-predictor, and count-embed heads through an abstract
//!   [`InferenceBackend`]
//! - Subword→word projection, span scoring, and greedy overlap-suppressed
//!   decoding
//! - Long-text chunking with cross-chunk entity merging
//!
//! The neural engine itself stays outside the crate: implement
//! [`InferenceBackend`] over Core ML, ONNX Runtime, or anything else that
//! can compile the exported module packages and answer named-tensor
//! prediction requests.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use gliner2_runtime::{Extractor, ExtractorConfig};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MyCoreMlBackend::new());
//! let extractor = Extractor::new("models/export_manifest.json", backend)?;
//!
//! let entities = extractor.extract_entities(
//!     "ACME Corp hired Jane Doe in Paris.",
//!     &["company", "person", "location"],
//!     Some(0.5),
//! )?;
//! for e in &entities {
//!     println!("{}: {} ({:.2})", e.label, e.text, e.score);
//! }
//! ```
//!
//! ## Concurrency
//!
//! An [`Extractor`] is immutable after construction and freely shareable.
//! Concurrent calls share the tokenizer and the compiled modules; each
//! module adapter serialises its own predictions, and no global lock is held
//! across pipeline stages. Long-running calls can be cancelled between
//! stages through a [`CancelToken`].

#![warn(missing_docs)]

mod adapters;
mod backend;
mod cancel;
pub mod chunk;
mod config;
mod entity;
mod error;
mod extractor;
mod manifest;
mod metadata;
pub mod pipeline;
mod tensor;
pub mod tokenizer;

pub use adapters::{
    ClassifierAdapter, CountEmbedAdapter, CountPredictorAdapter, EncoderAdapter, SpanRepAdapter,
};
pub use backend::{CompiledModule, InferenceBackend};
pub use cancel::CancelToken;
pub use chunk::{merge_entities, word_count, Chunker, TextChunk};
pub use config::{ChunkerConfig, ExtractorConfig, PoolingMethod, SimilarityMetric};
pub use entity::{group_by_label, Entity};
pub use error::{Error, Result};
pub use extractor::Extractor;
pub use manifest::{ArtifactPaths, Manifest};
pub use metadata::{SpanHeadMetadata, SpecialTokenIds};
pub use tensor::{Tensor, TensorMap};
pub use tokenizer::{
    PromptKind, PromptLocation, SchemaEncoding, Segment, SubwordMapping, SubwordToken, Tokenizer,
    UnigramModel, Word,
};

pub mod prelude {
    //! Commonly used items, re-exported for convenience.
    pub use crate::backend::{CompiledModule, InferenceBackend};
    pub use crate::cancel::CancelToken;
    pub use crate::config::ExtractorConfig;
    pub use crate::entity::Entity;
    pub use crate::error::{Error, Result};
    pub use crate::extractor::Extractor;
}
