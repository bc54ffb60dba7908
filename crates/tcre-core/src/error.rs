use std::path::PathBuf;

use thiserror::Error;

use crate::types::CandidateId;

/// Errors raised while building features and datasets.
#[derive(Debug, Error)]
pub enum TcreError {
    /// The marker list name is not one of the known lists.
    #[error("unknown marker list {0:?} (expected one of \"doub_01\", \"sngl_01\", \"mult_01\")")]
    UnknownMarkerList(String),

    /// The relation class has no registered candidate class.
    #[error("unknown relation class {0:?}")]
    UnknownRelationClass(String),

    /// The word embedding type tag is not recognized.
    #[error("word embedding type {0:?} not valid (expected \"w2v_frozen\", \"w2v_trained\" or \"denovo\")")]
    InvalidEmbeddingType(String),

    /// Required split names are absent from the split mapping.
    #[error("splits must contain keys {expected:?}, got keys {found:?}")]
    MissingSplits {
        /// Split names the operation needs.
        expected: Vec<String>,
        /// Split names actually present.
        found: Vec<String>,
    },

    /// Any other invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The split file is not a mapping of split name to integer ids.
    #[error("split file {path:?} is not a mapping of split name to candidate ids: {source}")]
    SplitFormat {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A word vector file could not be read.
    #[error("invalid word vector file: {0}")]
    Vectors(String),

    /// Feature rows carry labels outside `[0, 1]`.
    #[error("found label values outside [0, 1]; examples: {examples:?}")]
    LabelOutOfRange {
        /// Up to 10 distinct offending values.
        examples: Vec<f32>,
    },

    /// A split references a candidate with no feature row.
    #[error("split {split:?} references candidate {id} which has no feature record")]
    UnknownCandidate {
        /// Split name.
        split: String,
        /// Missing candidate id.
        id: CandidateId,
    },

    /// The store returned fewer candidates than were requested.
    #[error("resolved {found} of {requested} requested candidates; missing ids (first 10): {missing:?}")]
    MissingCandidates {
        /// Number of unique ids requested.
        requested: usize,
        /// Number of candidates resolved.
        found: usize,
        /// Up to 10 of the missing ids.
        missing: Vec<CandidateId>,
    },

    /// A candidate lacks the primary mention for one of its entity types.
    #[error("candidate {candidate} has no candidate mention of type {entity_type:?}")]
    MissingEntity {
        /// Candidate id.
        candidate: CandidateId,
        /// Entity type without a mention.
        entity_type: String,
    },

    /// A mention's word span is inverted or runs past the sentence.
    #[error("candidate {candidate} has mention {entity_type:?} with invalid word span {start}..{end} ({words} words)")]
    InvalidSpan {
        /// Candidate id.
        candidate: CandidateId,
        /// Entity type of the mention.
        entity_type: String,
        /// Mention start word.
        start: usize,
        /// Mention end word.
        end: usize,
        /// Number of words in the sentence.
        words: usize,
    },

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candidate storage failure.
    #[error("candidate storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Result type alias for tcre-core operations.
pub type Result<T> = std::result::Result<T, TcreError>;
