//! # Checkpoints
//!
//! Best-model snapshots described by an explicit manifest
//! (`checkpoints/manifest.json`) instead of metadata encoded in file names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TrainError};
use crate::trainer::ReduceLrOnPlateau;

pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const COMPONENT_MODEL: &str = "model";
pub const COMPONENT_OPTIMIZER: &str = "optimizer";
pub const COMPONENT_SCHEDULER: &str = "scheduler";

/// One persisted component file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub component: String,
    /// File name relative to the checkpoint directory.
    pub file: String,
    pub epoch: usize,
    pub score: f64,
}

/// Optimizer hyperparameters and step count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    pub step: usize,
}

/// Keeps the single best checkpoint of a run, keyed on a higher-is-better score.
#[derive(Debug)]
pub struct CheckpointWriter {
    dir: PathBuf,
    best: Option<f64>,
    files: Vec<PathBuf>,
}

impl CheckpointWriter {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            best: None,
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save all components when `score` beats every previous checkpoint.
    ///
    /// Returns whether a checkpoint was written.
    pub fn save_if_best(
        &mut self,
        epoch: usize,
        score: f64,
        varmap: &VarMap,
        optimizer: &OptimizerState,
        scheduler: &ReduceLrOnPlateau,
    ) -> Result<bool> {
        if self.best.is_some_and(|best| score <= best) {
            return Ok(false);
        }

        let model_file = format!("{COMPONENT_MODEL}_{epoch}.safetensors");
        let optimizer_file = format!("{COMPONENT_OPTIMIZER}_{epoch}.json");
        let scheduler_file = format!("{COMPONENT_SCHEDULER}_{epoch}.json");

        varmap.save(self.dir.join(&model_file))?;
        std::fs::write(self.dir.join(&optimizer_file), serde_json::to_string_pretty(optimizer)?)?;
        std::fs::write(self.dir.join(&scheduler_file), serde_json::to_string_pretty(scheduler)?)?;

        let entries: Vec<ManifestEntry> = [
            (COMPONENT_MODEL, &model_file),
            (COMPONENT_OPTIMIZER, &optimizer_file),
            (COMPONENT_SCHEDULER, &scheduler_file),
        ]
        .into_iter()
        .map(|(component, file)| ManifestEntry {
            component: component.to_string(),
            file: file.clone(),
            epoch,
            score,
        })
        .collect();
        std::fs::write(self.dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&entries)?)?;

        let current: Vec<PathBuf> = entries.iter().map(|e| self.dir.join(&e.file)).collect();
        for old in self.files.drain(..) {
            if !current.contains(&old) {
                std::fs::remove_file(&old)?;
            }
        }
        self.files = current;
        self.best = Some(score);

        info!("Saved checkpoint for epoch {epoch} (f1 = {score:.4}) to {:?}", self.dir);
        Ok(true)
    }
}

/// A loaded manifest with exactly one file per component.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    dir: PathBuf,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Checkpoint {
    /// Read and validate a checkpoint directory's manifest.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let manifest = dir.join(MANIFEST_FILE);
        if !manifest.exists() {
            return Err(TrainError::MissingCheckpoint {
                what: MANIFEST_FILE.to_string(),
                dir,
            });
        }
        let listed: Vec<ManifestEntry> = serde_json::from_str(&std::fs::read_to_string(&manifest)?)?;

        let mut entries = BTreeMap::new();
        for entry in listed {
            if entries.contains_key(&entry.component) {
                return Err(TrainError::DuplicateCheckpoint {
                    component: entry.component,
                    dir,
                });
            }
            if !dir.join(&entry.file).exists() {
                return Err(TrainError::MissingCheckpoint { what: entry.file, dir });
            }
            entries.insert(entry.component.clone(), entry);
        }

        // Files left behind by another run also count as competing snapshots.
        for file in std::fs::read_dir(&dir)? {
            let name = file?.file_name().to_string_lossy().into_owned();
            let stray = entries
                .values()
                .find(|e| e.file != name && name.starts_with(&format!("{}_", e.component)));
            if let Some(entry) = stray {
                return Err(TrainError::DuplicateCheckpoint {
                    component: entry.component.clone(),
                    dir,
                });
            }
        }
        Ok(Self { dir, entries })
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn path(&self, component: &str) -> Result<PathBuf> {
        self.entries
            .get(component)
            .map(|e| self.dir.join(&e.file))
            .ok_or_else(|| TrainError::MissingCheckpoint {
                what: component.to_string(),
                dir: self.dir.clone(),
            })
    }

    /// Overwrite the variables of `varmap` with the saved model weights.
    pub fn restore_model(&self, varmap: &mut VarMap) -> Result<()> {
        varmap.load(self.path(COMPONENT_MODEL)?)?;
        Ok(())
    }

    pub fn optimizer_state(&self) -> Result<OptimizerState> {
        let content = std::fs::read_to_string(self.path(COMPONENT_OPTIMIZER)?)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn scheduler_state(&self) -> Result<ReduceLrOnPlateau> {
        let content = std::fs::read_to_string(self.path(COMPONENT_SCHEDULER)?)?;
        Ok(serde_json::from_str(&content)?)
    }
}
