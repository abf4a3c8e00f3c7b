//! Combines span representations with structure-projected label embeddings
//! into a `[words × widths × labels]` score tensor.

use ndarray::Array3;

use super::span::SpanBundle;

/// Build raw span/label scores via dot products.
///
/// The entity path scores against the *first* structure instance's label
/// projections; higher counts are reserved for other task kinds. Entries
/// whose span mask is off, or whose hidden sizes disagree, are left at zero.
/// When no structure instance was predicted the tensor is empty and the
/// decoder yields nothing.
#[must_use]
pub fn build_scores(bundle: &SpanBundle) -> Array3<f32> {
    let (num_words, max_width, hidden_size) = bundle.span_emb.dim();
    let num_labels = bundle.labels.len();

    if bundle.predicted_count == 0 || bundle.structure_emb.len_of(ndarray::Axis(0)) == 0 {
        return Array3::zeros((0, max_width, num_labels));
    }

    let mut scores = Array3::<f32>::zeros((num_words, max_width, num_labels));
    let label_capacity = bundle.structure_emb.len_of(ndarray::Axis(1));
    let structure_hidden = bundle.structure_emb.len_of(ndarray::Axis(2));
    if structure_hidden != hidden_size {
        // Hidden-size mismatch between heads: scores stay zero.
        log::warn!(
            "[Scorer] span hidden size {hidden_size} != structure hidden size {structure_hidden}"
        );
        return scores;
    }

    for word in 0..num_words {
        for width in 0..max_width {
            let slot = word * max_width + width;
            let masked = bundle
                .span_mask
                .get(slot)
                .map_or(true, |&mask| mask < 0.5);
            if masked {
                continue;
            }
            for label in 0..num_labels.min(label_capacity) {
                let mut dot = 0.0f32;
                for dim in 0..hidden_size {
                    dot += bundle.span_emb[[word, width, dim]]
                        * bundle.structure_emb[[0, label, dim]];
                }
                scores[[word, width, label]] = dot;
            }
        }
    }

    scores
}
