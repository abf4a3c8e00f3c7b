//! Entity types for zero-shot NER results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// A recognized named entity.
///
/// Offsets are character offsets into the original input (not bytes), with
/// `start < end` and `text == input[start..end]` when sliced by characters.
/// Equality and hashing cover `(text, label, start, end)`; the score is
/// deliberately excluded so that the same surface span found twice compares
/// equal regardless of confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Entity text (surface form, verbatim from the input).
    pub text: String,
    /// Entity type label, as supplied by the caller.
    pub label: String,
    /// Confidence score in `[0, 1]`.
    pub score: f32,
    /// Start position (character offset in the original text).
    pub start: u32,
    /// End position (character offset, exclusive).
    pub end: u32,
}

impl Entity {
    /// Create a new entity. The score is clamped into `[0, 1]`.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        label: impl Into<String>,
        score: f32,
        start: u32,
        end: u32,
    ) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
            score: score.clamp(0.0, 1.0),
            start,
            end,
        }
    }

    /// Character length of the entity span.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span is empty (never true for entities produced by the
    /// pipeline).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Check if this entity's character range overlaps another's.
    #[must_use]
    pub fn overlaps(&self, other: &Entity) -> bool {
        !(self.end <= other.start || other.end <= self.start)
    }

    /// Shift both offsets by `base` characters (used when translating
    /// chunk-local entities back into the original document).
    #[must_use]
    pub fn offset_by(mut self, base: u32) -> Self {
        self.start += base;
        self.end += base;
        self
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.label == other.label
            && self.start == other.start
            && self.end == other.end
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
        self.label.hash(state);
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] ({}..{}, {:.3})",
            self.text, self.label, self.start, self.end, self.score
        )
    }
}

/// Group entities by label string, preserving the input order within each
/// group. Mirrors the un-formatted per-label result shape of the reference
/// extractor.
#[must_use]
pub fn group_by_label(entities: &[Entity]) -> HashMap<String, Vec<Entity>> {
    let mut grouped: HashMap<String, Vec<Entity>> = HashMap::new();
    for entity in entities {
        grouped
            .entry(entity.label.clone())
            .or_default()
            .push(entity.clone());
    }
    grouped
}

/// Extract a substring by character offsets (not byte offsets).
pub(crate) fn char_slice(text: &str, char_start: usize, char_end: usize) -> String {
    text.chars()
        .skip(char_start)
        .take(char_end.saturating_sub(char_start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_score() {
        let a = Entity::new("Paris", "location", 0.9, 10, 15);
        let b = Entity::new("Paris", "location", 0.4, 10, 15);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn equality_covers_label() {
        let a = Entity::new("Paris", "location", 0.9, 10, 15);
        let b = Entity::new("Paris", "city", 0.9, 10, 15);
        assert_ne!(a, b);
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(Entity::new("x", "y", 1.7, 0, 1).score, 1.0);
        assert_eq!(Entity::new("x", "y", -0.2, 0, 1).score, 0.0);
    }

    #[test]
    fn overlap_is_exclusive_at_boundaries() {
        let a = Entity::new("ab", "t", 1.0, 0, 2);
        let b = Entity::new("cd", "t", 1.0, 2, 4);
        assert!(!a.overlaps(&b));

        let c = Entity::new("bc", "t", 1.0, 1, 3);
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn char_slice_handles_unicode() {
        let text = "héllo wörld";
        assert_eq!(char_slice(text, 6, 11), "wörld");
    }

    #[test]
    fn grouping_preserves_order() {
        let entities = vec![
            Entity::new("a", "person", 0.9, 0, 1),
            Entity::new("b", "place", 0.8, 2, 3),
            Entity::new("c", "person", 0.7, 4, 5),
        ];
        let grouped = group_by_label(&entities);
        assert_eq!(grouped["person"].len(), 2);
        assert_eq!(grouped["person"][0].text, "a");
        assert_eq!(grouped["person"][1].text, "c");
        assert_eq!(grouped["place"].len(), 1);
    }
}
