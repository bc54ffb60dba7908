//! # tcre Trainer
//!
//! Model side of the relation extraction pipeline: configuration schema,
//! recurrent classifier, training loop with plateau scheduling, early
//! stopping and manifest-based checkpoints, and inference.
//!
//! Binaries:
//! - `tcre`: `train` and `predict` commands
//! - `import_candidates`: seed a SQLite candidate store from JSON lines
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod trainer;

// Re-export primary API
pub use checkpoint::{Checkpoint, CheckpointWriter, ManifestEntry, OptimizerState};
pub use config::{parse_device, CommonOptions, ModelingConfig, TrainOptions};
pub use error::{Result, TrainError};
pub use inference::Predictor;
pub use metrics::{BinaryMetrics, EvalRecord, EvalType, Prediction};
pub use model::{build_model, Batch, CellType, ModelArgs, ModelSize, RelationRnn};
pub use output::{ensure_clearable, init_output_dir, load_predictions, FieldsBundle};
pub use pipeline::{run_predict, run_train, TrainRun};
pub use trainer::{supervise, EarlyStopping, ReduceLrOnPlateau, TrainingOutcome, TrainingParams};
