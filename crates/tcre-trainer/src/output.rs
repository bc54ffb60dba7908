//! # Run Outputs
//!
//! Output directory initialization and the files a run leaves behind:
//! `fields.json` (+ `fields.safetensors`), `history.json`, `config.json`
//! and `predictions.json`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use tcre_core::{CandidateId, Embeddings, FieldSpec, Vocab};
use tracing::info;

use crate::error::{Result, TrainError};
use crate::metrics::{EvalRecord, Prediction};

pub const FIELDS_FILE: &str = "fields.json";
pub const FIELD_VECTORS_FILE: &str = "fields.safetensors";
pub const HISTORY_FILE: &str = "history.json";
pub const CONFIG_FILE: &str = "config.json";
pub const PREDICTIONS_FILE: &str = "predictions.json";

const VECTORS_TENSOR: &str = "vectors";

/// Resolve `path` and refuse anything within two components of the root.
pub fn ensure_clearable(path: &Path) -> Result<PathBuf> {
    let resolved = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => std::path::absolute(path)?,
    };
    let depth = resolved
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .count();
    if depth <= 2 {
        return Err(TrainError::UnsafeOutputDir(path.to_path_buf()));
    }
    Ok(resolved)
}

/// Clear (when present) and create the output directory.
pub fn init_output_dir(path: &Path) -> Result<()> {
    info!("Initializing {path:?}");
    if path.exists() {
        ensure_clearable(path)?;
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Input field definitions needed to rebuild a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldsBundle {
    pub fields: FieldSpec,
    pub vocab: Vocab,
    /// Set when the vocabulary carries pretrained vectors.
    pub embedding_dim: Option<usize>,
}

impl FieldsBundle {
    pub fn new(fields: FieldSpec, vocab: Vocab) -> Self {
        let embedding_dim = vocab.vectors().map(|v| v.dim);
        Self {
            fields,
            vocab,
            embedding_dim,
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::write(dir.join(FIELDS_FILE), serde_json::to_string(self)?)?;
        if let Some(vectors) = self.vocab.vectors() {
            let table = Tensor::from_vec(vectors.data.clone(), (self.vocab.len(), vectors.dim), &Device::Cpu)?;
            let tensors = HashMap::from([(VECTORS_TENSOR.to_string(), table)]);
            candle_core::safetensors::save(&tensors, dir.join(FIELD_VECTORS_FILE))?;
        }
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let mut bundle: Self = serde_json::from_str(&std::fs::read_to_string(dir.join(FIELDS_FILE))?)?;
        if let Some(dim) = bundle.embedding_dim {
            let tensors = candle_core::safetensors::load(dir.join(FIELD_VECTORS_FILE), &Device::Cpu)?;
            let table = tensors.get(VECTORS_TENSOR).ok_or_else(|| TrainError::MissingCheckpoint {
                what: format!("{FIELD_VECTORS_FILE}:{VECTORS_TENSOR}"),
                dir: dir.to_path_buf(),
            })?;
            let data = table.flatten_all()?.to_vec1::<f32>()?;
            bundle.vocab.set_vectors(Embeddings { dim, data })?;
        }
        Ok(bundle)
    }
}

pub fn save_history(dir: &Path, history: &[EvalRecord]) -> Result<()> {
    std::fs::write(dir.join(HISTORY_FILE), serde_json::to_string(history)?)?;
    Ok(())
}

/// Column-oriented prediction table: `{"id": {"0": ..}, "y_true": {..}, "y_pred": {..}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PredictionColumns {
    id: BTreeMap<usize, CandidateId>,
    y_true: BTreeMap<usize, f32>,
    y_pred: BTreeMap<usize, f32>,
}

pub fn save_predictions(path: &Path, predictions: &[Prediction]) -> Result<()> {
    let mut columns = PredictionColumns::default();
    for (row, p) in predictions.iter().enumerate() {
        columns.id.insert(row, p.id);
        columns.y_true.insert(row, p.y_true);
        columns.y_pred.insert(row, p.y_pred);
    }
    std::fs::write(path, serde_json::to_string(&columns)?)?;
    Ok(())
}

pub fn load_predictions(path: &Path) -> Result<Vec<Prediction>> {
    let columns: PredictionColumns = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    columns
        .id
        .iter()
        .map(|(row, &id)| {
            match (columns.y_true.get(row), columns.y_pred.get(row)) {
                (Some(&y_true), Some(&y_pred)) => Ok(Prediction { id, y_true, y_pred }),
                _ => Err(TrainError::Consistency(format!("prediction row {row} is incomplete"))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_paths_near_root() {
        assert!(matches!(ensure_clearable(Path::new("/")), Err(TrainError::UnsafeOutputDir(_))));
        assert!(matches!(ensure_clearable(Path::new("/tmp")), Err(TrainError::UnsafeOutputDir(_))));
        assert!(ensure_clearable(Path::new("/tmp/a/b/exp1")).is_ok());
    }

    #[test]
    fn init_clears_existing_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("run");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("stale.txt"), "x").unwrap();
        init_output_dir(&out).unwrap();
        assert!(out.exists());
        assert!(!out.join("stale.txt").exists());
    }

    #[test]
    fn fields_bundle_restores_vectors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut vocab = Vocab::from_tokens(["il-2".to_string()]);
        vocab
            .set_vectors(Embeddings {
                dim: 2,
                data: vec![0.0, 0.0, 0.0, 0.0, 0.5, -0.5],
            })
            .unwrap();
        FieldsBundle::new(FieldSpec::default(), vocab.clone()).save(tmp.path()).unwrap();

        let bundle = FieldsBundle::load(tmp.path()).unwrap();
        assert_eq!(bundle.vocab.index("il-2"), 2);
        assert_eq!(bundle.vocab.vectors(), vocab.vectors());
        assert_eq!(bundle.fields, FieldSpec::default());
    }

    #[test]
    fn predictions_are_column_oriented() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(PREDICTIONS_FILE);
        let rows = vec![
            Prediction { id: 6, y_true: 1.0, y_pred: 0.0 },
            Prediction { id: 7, y_true: 0.0, y_pred: 0.0 },
        ];
        save_predictions(&path, &rows).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["id"]["1"], 7);
        assert_eq!(json["y_true"]["0"], 1.0);
        assert_eq!(load_predictions(&path).unwrap(), rows);
    }
}
