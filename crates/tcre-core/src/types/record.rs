use serde::{Deserialize, Serialize};

use super::candidate::CandidateId;

/// Marked token sequence with distance features for one candidate.
///
/// `text`, `e0_dist` and `e1_dist` always have the same length; length
/// normalization happens later, in the dataset assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Candidate id.
    pub id: CandidateId,
    /// Tokens after marker insertion, swaps and optional lowercasing.
    pub text: Vec<String>,
    /// Label in `[0, 1]`.
    pub label: f32,
    /// Signed token distance to the first entity span (0 inside the span).
    pub e0_dist: Vec<i64>,
    /// Signed token distance to the second entity span (0 inside the span).
    pub e1_dist: Vec<i64>,
}

impl FeatureRecord {
    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns `true` if the label lies in `[0, 1]` (NaN is out of range).
    #[must_use]
    pub fn has_valid_label(&self) -> bool {
        (0.0..=1.0).contains(&self.label)
    }
}

impl std::fmt::Display for FeatureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FeatureRecord(id={}, label={}, text={:?}, e0_dist={:?}, e1_dist={:?})",
            self.id, self.label, self.text, self.e0_dist, self.e1_dist
        )
    }
}
