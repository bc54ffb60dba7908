//! Restores a trained classifier from an output directory and labels datasets.

use std::path::Path;

use candle_core::Device;
use candle_nn::VarMap;
use tcre_core::{BatchOrder, Dataset, FieldSpec};
use tracing::info;

use crate::checkpoint::{Checkpoint, CHECKPOINT_DIR};
use crate::config::ModelingConfig;
use crate::error::Result;
use crate::metrics::Prediction;
use crate::model::{build_model, Batch, ModelArgs, RelationRnn};
use crate::output::FieldsBundle;

/// A trained model plus the input fields it was trained with.
pub struct Predictor {
    bundle: FieldsBundle,
    model: RelationRnn,
    device: Device,
}

impl Predictor {
    /// Rebuild the model described by `config` and load its best checkpoint.
    pub fn load(output_dir: &Path, config: &ModelingConfig, device: &Device) -> Result<Self> {
        let checkpoint_dir = output_dir.join(CHECKPOINT_DIR);
        info!("Loading model state from checkpoint dir {checkpoint_dir:?}");
        let checkpoint = Checkpoint::load(&checkpoint_dir)?;
        let bundle = FieldsBundle::load(output_dir)?;

        let mut args = config.model_args.clone().unwrap_or_else(|| ModelArgs::from_config(config));
        args.device = config.common.device.clone();

        let mut varmap = VarMap::new();
        let model = build_model(&bundle.vocab, &args, &mut varmap, device)?;
        checkpoint.restore_model(&mut varmap)?;
        info!("Restored model with arguments: {args:?}");

        Ok(Self {
            bundle,
            model,
            device: device.clone(),
        })
    }

    pub fn fields(&self) -> &FieldSpec {
        &self.bundle.fields
    }

    /// Hard predictions for every example, visited in ascending length order.
    pub fn predict(&self, dataset: &Dataset, batch_size: usize) -> Result<Vec<Prediction>> {
        let max_dist = self.model.args().max_dist;
        let mut predictions = Vec::with_capacity(dataset.len());
        for examples in dataset.batches(batch_size, BatchOrder::ByLength) {
            let batch = Batch::prepare(&examples, &self.bundle.vocab, max_dist, &self.device)?;
            let y_pred = self.model.predict(&batch)?;
            predictions.extend(examples.iter().zip(y_pred).map(|(example, y_pred)| Prediction {
                id: example.id,
                y_true: example.label,
                y_pred,
            }));
        }
        Ok(predictions)
    }
}
