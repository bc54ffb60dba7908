//! # Modeling Configuration
//!
//! Declarative option schema shared by the `train` and `predict` commands and
//! the resolved configuration persisted to `config.json`.

use std::path::{Path, PathBuf};

use candle_core::Device;
use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};
use tcre_core::{
    CandidateClass, EmbeddingType, MarkerConfig, MarkerListName, Markers, MissingCandidatePolicy,
    Swaps, TcreError, WordEmbedding,
};

use crate::error::Result;
use crate::model::{CellType, ModelArgs, ModelSize};

/// Default RNG seed.
pub const DEFAULT_SEED: u64 = 38_715;

/// Options required by every command.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct CommonOptions {
    /// Candidate type class (e.g. "inducing_cytokine")
    #[arg(long)]
    pub relation_class: String,

    /// Device to use ("cpu", "cuda", "cuda:N" or "metal")
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Batch size used in training and prediction
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Output directory (nothing saved if omitted when training)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// RNG seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Log level ("error", "warn", "info", "debug", "trace")
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// SQLite database holding the candidates
    #[arg(long, default_value = "candidates.db")]
    pub candidate_db: PathBuf,
}

/// Options of the `train` command.
#[derive(Debug, Clone, PartialEq, Args, Serialize, Deserialize)]
pub struct TrainOptions {
    /// Path to json file containing candidate ids keyed by split name ("train", "val", "test")
    #[arg(long)]
    pub splits_file: PathBuf,

    /// Marker list name ("doub_01", "sngl_01", "mult_01")
    #[arg(long, default_value = "mult_01")]
    pub marker_list: MarkerListName,

    /// Save checkpoint for best model
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub use_checkpoints: bool,

    /// Use secondary markers
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub use_secondary: bool,

    /// Use swaps for primary entity text
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub use_swaps: bool,

    /// Whether or not to use only lower case tokens
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub use_lower: bool,

    /// Whether or not to use positional features
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub use_positions: bool,

    /// One of "w2v_frozen", "w2v_trained", or "denovo"
    #[arg(long, default_value = "w2v_frozen")]
    pub wrd_embedding_type: EmbeddingType,

    /// word2vec file for the pretrained embedding types
    #[arg(long)]
    pub w2v_path: Option<PathBuf>,

    /// For pre-trained vectors, max vocab size
    #[arg(long, default_value_t = 50_000)]
    pub vocab_limit: usize,

    /// One of "S", "M", "L", "XL"
    #[arg(long, default_value = "S")]
    pub model_size: ModelSize,

    /// Use bi-directional RNN
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub bidirectional: bool,

    /// LSTM or GRU
    #[arg(long, default_value = "LSTM")]
    pub cell_type: CellType,

    /// Number of stacked recurrent layers
    #[arg(long, default_value_t = 1)]
    pub num_layers: usize,

    /// Distances beyond this are clamped before position embedding
    #[arg(long, default_value_t = 50)]
    pub max_dist: usize,

    /// Weight decay for training
    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f64,

    /// Dropout rate
    #[arg(long, default_value_t = 0.0)]
    pub dropout: f32,

    /// Learning rate
    #[arg(long, default_value_t = 0.005)]
    pub learning_rate: f64,

    /// Maximum number of training epochs
    #[arg(long, default_value_t = 250)]
    pub max_epochs: usize,

    /// Epochs without validation F1 improvement before stopping
    #[arg(long, default_value_t = 25)]
    pub es_patience: usize,

    /// Epochs without validation F1 improvement before reducing the learning rate
    #[arg(long, default_value_t = 25)]
    pub lr_patience: usize,

    /// What to do with split ids missing from the candidate store ("fail" or "drop")
    #[arg(long, default_value = "fail")]
    pub missing_policy: MissingCandidatePolicy,

    /// Resulting data to save as csv list (output_dir must be set to have an effect)
    #[arg(long, default_value = "history,config,fields")]
    pub save_keys: String,
}

/// Fully resolved configuration, persisted as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelingConfig {
    #[serde(flatten)]
    pub common: CommonOptions,
    #[serde(flatten)]
    pub train: TrainOptions,
    pub entity_types: [String; 2],
    /// `key=value` pairs of every option, joined by `:`.
    pub label: String,
    pub markers: Markers,
    pub swaps: Option<Swaps>,
    /// Set once the model has been built.
    pub model_args: Option<ModelArgs>,
}

impl ModelingConfig {
    /// Resolve options against a candidate class.
    pub fn resolve(common: CommonOptions, train: TrainOptions, class: &CandidateClass) -> Result<Self> {
        if common.batch_size == 0 {
            return Err(TcreError::Config("batch size must be positive".into()).into());
        }
        if train.num_layers == 0 {
            return Err(TcreError::Config("num_layers must be positive".into()).into());
        }
        if !(0.0..1.0).contains(&train.dropout) {
            return Err(TcreError::Config(format!("dropout {} not in [0, 1)", train.dropout)).into());
        }
        // Fail on a missing vector path before any data is touched.
        WordEmbedding::resolve(train.wrd_embedding_type, train.w2v_path.clone(), train.vocab_limit)?;

        let marker_config = MarkerConfig::build(
            train.marker_list.as_str(),
            train.use_secondary,
            &class.entity_types,
            train.use_swaps,
        )?;
        let label = option_label(&common, &train)?;

        Ok(Self {
            common,
            train,
            entity_types: class.entity_types.clone(),
            label,
            markers: marker_config.markers,
            swaps: marker_config.swaps,
            model_args: None,
        })
    }

    pub fn marker_config(&self) -> MarkerConfig {
        MarkerConfig {
            markers: self.markers.clone(),
            swaps: self.swaps.clone(),
        }
    }

    pub fn word_embedding(&self) -> Result<WordEmbedding> {
        Ok(WordEmbedding::resolve(
            self.train.wrd_embedding_type,
            self.train.w2v_path.clone(),
            self.train.vocab_limit,
        )?)
    }

    /// Requested output artifacts, normalized to lowercase.
    pub fn save_keys(&self) -> Vec<String> {
        self.train
            .save_keys
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn option_label(common: &CommonOptions, train: &TrainOptions) -> Result<String> {
    let mut fields = serde_json::Map::new();
    for value in [serde_json::to_value(common)?, serde_json::to_value(train)?] {
        if let serde_json::Value::Object(map) = value {
            fields.extend(map);
        }
    }
    Ok(fields
        .iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{k}={s}"),
            serde_json::Value::Null => format!("{k}=None"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(":"))
}

/// Parse a device string.
pub fn parse_device(device: &str) -> Result<Device> {
    match device {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::new_cuda(0)?),
        "metal" => Ok(Device::new_metal(0)?),
        other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
            Some(Ok(ordinal)) => Ok(Device::new_cuda(ordinal)?),
            _ => Err(TcreError::Config(format!("unknown device {other:?}")).into()),
        },
    }
}
