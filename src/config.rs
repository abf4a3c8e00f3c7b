//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Similarity metric for the legacy pooled-embedding scorer.
///
/// Reserved for the fallback path; the GLiNER2 span head scores with raw dot
/// products and ignores this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine similarity over L2-normalized embeddings.
    Cosine,
    /// Raw dot product.
    Dot,
}

/// Pooling method for the legacy pooled-embedding scorer.
///
/// Reserved for the fallback path; unused by the GLiNER2 span head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMethod {
    /// Arithmetic mean over token embeddings.
    Mean,
    /// Element-wise maximum.
    Max,
    /// Concatenation of first and last token embeddings.
    Concat,
}

/// Configuration for the long-text chunker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk window. Must be at least 256.
    pub max_chars: usize,
    /// Characters of overlap between consecutive chunks.
    pub overlap_chars: usize,
    /// Maximum whitespace-separated words per chunk.
    pub max_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1600,
            overlap_chars: 200,
            max_words: 240,
        }
    }
}

/// Configuration for the extractor.
///
/// `max_sequence_length` must equal the compiled capacity of the backend
/// modules named by the manifest; construction fails otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Global sigmoid cutoff applied during span decoding.
    pub threshold: f32,
    /// Maximum subword sequence length accepted by the encoder.
    pub max_sequence_length: usize,
    /// Maximum span width in words considered by the span head.
    pub max_span_length: usize,
    /// Chunk advance in characters for the legacy stride-based splitter.
    pub stride_length: usize,
    /// Long-text chunker settings.
    pub chunker: ChunkerConfig,
    /// Similarity metric for the legacy pooled scorer (unused by GLiNER2).
    pub similarity_metric: SimilarityMetric,
    /// Pooling method for the legacy pooled scorer (unused by GLiNER2).
    pub pooling_method: PoolingMethod,
    /// IoU threshold for the legacy NMS path. The GLiNER2 decoder uses strict
    /// interval overlap instead.
    pub nms_threshold: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_sequence_length: 384,
            max_span_length: 8,
            stride_length: 192,
            chunker: ChunkerConfig::default(),
            similarity_metric: SimilarityMetric::Cosine,
            pooling_method: PoolingMethod::Mean,
            nms_threshold: 0.5,
        }
    }
}

impl ExtractorConfig {
    /// Validate user-supplied values that have hard bounds.
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(crate::Error::invalid_input(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        if self.max_sequence_length < 2 {
            return Err(crate::Error::invalid_input(format!(
                "max_sequence_length must be at least 2, got {}",
                self.max_sequence_length
            )));
        }
        if self.max_span_length == 0 {
            return Err(crate::Error::invalid_input(
                "max_span_length must be non-zero",
            ));
        }
        if self.chunker.max_chars < 256 {
            return Err(crate::Error::invalid_input(format!(
                "chunker.max_chars must be at least 256, got {}",
                self.chunker.max_chars
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ExtractorConfig::default();
        assert_eq!(config.threshold, 0.3);
        assert_eq!(config.max_sequence_length, 384);
        assert_eq!(config.max_span_length, 8);
        assert_eq!(config.stride_length, 192);
        assert_eq!(config.chunker.max_chars, 1600);
        assert_eq!(config.chunker.overlap_chars, 200);
        assert_eq!(config.chunker.max_words, 240);
        assert_eq!(config.nms_threshold, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = ExtractorConfig {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_tiny_chunk_window() {
        let config = ExtractorConfig {
            chunker: ChunkerConfig {
                max_chars: 100,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let config = ExtractorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExtractorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_sequence_length, config.max_sequence_length);
        assert_eq!(back.similarity_metric, SimilarityMetric::Cosine);
    }
}
