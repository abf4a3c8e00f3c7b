//! Error types for gliner2-runtime.

use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for runtime operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A model artifact, manifest, tokenizer directory, or required special
    /// token could not be located.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Tokenizer loading or encoding failed.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Tensor/mapping shapes between pipeline stages do not line up.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid input provided by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A backend returned a tensor of unexpected rank, dtype, or name.
    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    /// A backend prediction failed. Carries the pipeline stage that issued
    /// the call so failures are attributable.
    #[error("Inference failed in {stage}: {message}")]
    Inference {
        /// Pipeline stage that issued the backend call.
        stage: &'static str,
        /// Backend error, verbatim.
        message: String,
    },

    /// The call was cancelled between pipeline stages.
    #[error("Extraction cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON or descriptor parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Create a resource error.
    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }

    /// Create a tokenizer error.
    pub fn tokenizer(msg: impl Into<String>) -> Self {
        Error::Tokenizer(msg.into())
    }

    /// Create an encoding error.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Error::Encoding(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an invalid output error.
    pub fn invalid_output(msg: impl Into<String>) -> Self {
        Error::InvalidOutput(msg.into())
    }

    /// Wrap a backend failure with the pipeline stage that issued the call.
    pub fn inference(stage: &'static str, msg: impl Into<String>) -> Self {
        Error::Inference {
            stage,
            message: msg.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }
}
