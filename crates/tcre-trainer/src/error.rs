use std::path::PathBuf;

use tcre_core::TcreError;
use thiserror::Error;

/// Errors raised while training, checkpointing or predicting.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Feature, dataset or configuration failure from the data side.
    #[error(transparent)]
    Core(#[from] TcreError),

    /// Tensor computation failure.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// A checkpoint manifest lists several files for one component.
    #[error("found multiple checkpoint files for component {component:?} in dir {dir:?}")]
    DuplicateCheckpoint {
        /// Component name.
        component: String,
        /// Checkpoint directory.
        dir: PathBuf,
    },

    /// A checkpoint component or manifest is absent.
    #[error("checkpoint {what} not found in dir {dir:?}")]
    MissingCheckpoint {
        /// What was looked for.
        what: String,
        /// Checkpoint directory.
        dir: PathBuf,
    },

    /// A required dataset was not assembled.
    #[error("expecting dataset with key {key:?}; got datasets {available:?}")]
    MissingDataset {
        /// Dataset name.
        key: String,
        /// Names of the datasets present.
        available: Vec<String>,
    },

    /// Internal invariant violation.
    #[error("internal consistency error: {0}")]
    Consistency(String),

    /// Refused to clear a directory too close to the filesystem root.
    #[error("path {0:?} is too close to root dir to delete (are you sure this is correct?)")]
    UnsafeOutputDir(PathBuf),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for tcre-trainer operations.
pub type Result<T> = std::result::Result<T, TrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_pass_through() {
        let err: TrainError = TcreError::UnknownMarkerList("x".into()).into();
        assert!(err.to_string().contains("unknown marker list"));
    }

    #[test]
    fn duplicate_checkpoint_names_component() {
        let err = TrainError::DuplicateCheckpoint {
            component: "model".into(),
            dir: PathBuf::from("/runs/a/checkpoints"),
        };
        assert!(err.to_string().contains("\"model\""));
    }
}
