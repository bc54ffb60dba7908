//! # Training Orchestrator
//!
//! Explicit epoch loop: optimize on the training split, then evaluate train
//! and validation, log, step the learning rate scheduler, check early
//! stopping and write a checkpoint when validation F1 improves. The test
//! split (or validation when absent) is evaluated once at the end.

mod early_stopping;
mod plateau;

pub use early_stopping::EarlyStopping;
pub use plateau::ReduceLrOnPlateau;

use std::path::PathBuf;

use candle_core::Device;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use tcre_core::{BatchOrder, Dataset, Vocab};
use tracing::info;

use crate::checkpoint::{CheckpointWriter, OptimizerState, CHECKPOINT_DIR};
use crate::config::ModelingConfig;
use crate::error::{Result, TrainError};
use crate::metrics::{BinaryMetrics, EvalRecord, EvalType, Prediction};
use crate::model::{Batch, RelationRnn};

pub const LR_FACTOR: f64 = 0.25;
pub const LR_THRESHOLD: f64 = 0.01;
pub const LOG_ITER_INTERVAL: usize = 10;

/// Loop hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub max_epochs: usize,
    pub es_patience: usize,
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub lr_threshold: f64,
    pub log_iter_interval: usize,
    pub batch_size: usize,
    pub seed: u64,
    /// Checkpoints are written under `<model_dir>/checkpoints` when set.
    pub model_dir: Option<PathBuf>,
}

impl TrainingParams {
    pub fn from_config(config: &ModelingConfig) -> Self {
        let train = &config.train;
        Self {
            learning_rate: train.learning_rate,
            weight_decay: train.weight_decay,
            max_epochs: train.max_epochs,
            es_patience: train.es_patience,
            lr_patience: train.lr_patience,
            lr_factor: LR_FACTOR,
            lr_threshold: LR_THRESHOLD,
            log_iter_interval: LOG_ITER_INTERVAL,
            batch_size: config.common.batch_size,
            seed: config.common.seed,
            model_dir: if train.use_checkpoints {
                config.common.output_dir.clone()
            } else {
                None
            },
        }
    }
}

/// Result of a supervised run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub history: Vec<EvalRecord>,
    pub test_predictions: Vec<Prediction>,
    /// Number of completed epochs.
    pub epochs: usize,
}

/// Run the model over a dataset, accumulating rounded-output metrics.
pub fn evaluate(
    model: &RelationRnn,
    vocab: &Vocab,
    dataset: &Dataset,
    batch_size: usize,
    device: &Device,
) -> Result<(BinaryMetrics, Vec<Prediction>)> {
    let mut metrics = BinaryMetrics::default();
    let mut predictions = Vec::with_capacity(dataset.len());
    for examples in dataset.batches(batch_size, BatchOrder::ByLength) {
        let batch = Batch::prepare(&examples, vocab, model.args().max_dist, device)?;
        let y_pred = model.predict(&batch)?;
        for ((id, example), y_pred) in batch.ids.iter().zip(&examples).zip(y_pred) {
            metrics.update(y_pred, example.label);
            predictions.push(Prediction {
                id: *id,
                y_true: example.label,
                y_pred,
            });
        }
    }
    Ok((metrics, predictions))
}

/// Train `model` (whose trainable variables live in `varmap`).
#[allow(clippy::too_many_arguments)]
pub fn supervise(
    model: &RelationRnn,
    varmap: &VarMap,
    vocab: &Vocab,
    train: &Dataset,
    val: &Dataset,
    test: Option<&Dataset>,
    params: &TrainingParams,
    device: &Device,
) -> Result<TrainingOutcome> {
    let adam = ParamsAdamW {
        lr: params.learning_rate,
        weight_decay: params.weight_decay,
        ..Default::default()
    };
    let mut optimizer = AdamW::new(varmap.all_vars(), adam.clone())?;
    let mut scheduler = ReduceLrOnPlateau::new(params.lr_factor, params.lr_patience, params.lr_threshold);
    let mut early_stopping = EarlyStopping::new(params.es_patience);
    let mut checkpoints = params
        .model_dir
        .as_ref()
        .map(|dir| CheckpointWriter::create(dir.join(CHECKPOINT_DIR)))
        .transpose()?;

    let max_dist = model.args().max_dist;
    let log_interval = params.log_iter_interval.max(1);
    let mut history = Vec::new();
    let mut iteration = 0usize;
    let mut epochs = 0usize;

    for epoch in 1..=params.max_epochs {
        let order = BatchOrder::Shuffled {
            seed: params.seed.wrapping_add(epoch as u64),
        };
        for examples in train.batches(params.batch_size, order) {
            let batch = Batch::prepare(&examples, vocab, max_dist, device)?;
            let logits = model.forward(&batch, true)?;
            let loss = candle_nn::loss::binary_cross_entropy_with_logit(&logits, &batch.labels)?;
            optimizer.backward_step(&loss)?;
            iteration += 1;
            if iteration % log_interval == 0 {
                info!(
                    "Epoch[{epoch}] Iteration[{iteration}] Loss: {:.4} LR: {}",
                    loss.to_scalar::<f32>()?,
                    optimizer.learning_rate()
                );
            }
        }
        epochs = epoch;

        let lr = optimizer.learning_rate();
        let (train_metrics, _) = evaluate(model, vocab, train, params.batch_size, device)?;
        let (val_metrics, _) = evaluate(model, vocab, val, params.batch_size, device)?;
        for record in [
            EvalRecord::new(EvalType::Training, epoch, &train_metrics, lr),
            EvalRecord::new(EvalType::Validation, epoch, &val_metrics, lr),
        ] {
            info!("{record}");
            history.push(record);
        }

        let score = val_metrics.f1();
        optimizer.set_learning_rate(scheduler.step(score, lr));
        let stop = early_stopping.update(score);

        if let Some(writer) = checkpoints.as_mut() {
            let state = OptimizerState {
                lr: optimizer.learning_rate(),
                beta1: adam.beta1,
                beta2: adam.beta2,
                eps: adam.eps,
                weight_decay: adam.weight_decay,
                step: iteration,
            };
            writer.save_if_best(epoch, score, varmap, &state, &scheduler)?;
        }

        if stop {
            info!("EarlyStopping: Stop training after epoch {epoch}");
            break;
        }
    }

    let test = test.unwrap_or(val);
    let (test_metrics, test_predictions) = evaluate(model, vocab, test, params.batch_size, device)?;
    if test_predictions.len() != test.len() {
        return Err(TrainError::Consistency(format!(
            "found {} test predictions, expecting {}",
            test_predictions.len(),
            test.len()
        )));
    }
    let record = EvalRecord::new(EvalType::Test, epochs, &test_metrics, optimizer.learning_rate());
    info!("{record}");
    history.push(record);

    Ok(TrainingOutcome {
        history,
        test_predictions,
        epochs,
    })
}
