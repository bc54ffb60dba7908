//! # Pipelines
//!
//! The two end-to-end flows behind the command line: training a model from a
//! split file and labeling a `predict` split with a trained model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarMap;
use tcre_core::{
    assemble_datasets, resolve_candidates, CandidateClass, CandidateStore, Dataset, EntitySelection,
    FeatureBuilder, FeatureTable, FieldSpec, Splits, PREDICTION_SPLITS, SPLIT_PREDICT, SPLIT_TEST,
    SPLIT_TRAIN, SPLIT_VAL, TRAINING_SPLITS,
};
use tracing::{info, warn};

use crate::config::{parse_device, CommonOptions, ModelingConfig, TrainOptions};
use crate::error::{Result, TrainError};
use crate::inference::Predictor;
use crate::metrics::Prediction;
use crate::model::{build_model, ModelArgs};
use crate::output::{
    init_output_dir, save_history, save_predictions, FieldsBundle, CONFIG_FILE, PREDICTIONS_FILE,
};
use crate::trainer::{supervise, TrainingOutcome, TrainingParams};

/// Everything a training run produced.
#[derive(Debug)]
pub struct TrainRun {
    pub config: ModelingConfig,
    pub outcome: TrainingOutcome,
}

fn select<'a>(datasets: &'a BTreeMap<String, Dataset>, key: &str) -> Result<&'a Dataset> {
    datasets.get(key).ok_or_else(|| TrainError::MissingDataset {
        key: key.to_string(),
        available: datasets.keys().cloned().collect(),
    })
}

fn seed_device(device: &Device, seed: u64) -> Result<()> {
    // The CPU backend has no seedable generator.
    if !device.is_cpu() {
        device.set_seed(seed)?;
    }
    Ok(())
}

fn features(config: &ModelingConfig, class: &CandidateClass, cands: &[tcre_core::Candidate]) -> Result<FeatureTable> {
    let markers = config.marker_config();
    let builder = FeatureBuilder::new(
        &markers,
        &class.entity_types,
        config.train.use_lower,
        EntitySelection::for_secondary(config.train.use_secondary),
    );
    Ok(builder.build(cands)?)
}

/// Train a single model.
pub fn run_train<S: CandidateStore + ?Sized>(
    common: CommonOptions,
    options: TrainOptions,
    store: &S,
) -> Result<TrainRun> {
    let class = CandidateClass::from_relation_class(&common.relation_class)?;
    let mut config = ModelingConfig::resolve(common, options, &class)?;
    info!("Modeling config:\n{config:#?}");

    let output_dir = config.common.output_dir.clone();
    if let Some(dir) = &output_dir {
        init_output_dir(dir)?;
    }

    let device = parse_device(&config.common.device)?;
    seed_device(&device, config.common.seed)?;

    let mut splits = Splits::load(&config.train.splits_file, Some(&TRAINING_SPLITS[..]))?;
    splits.require(&TRAINING_SPLITS)?;
    let cands = resolve_candidates(store, &class, &mut splits, config.train.missing_policy)?;

    let table = features(&config, &class, &cands)?;
    let fields = FieldSpec::default();
    let datasets = assemble_datasets(&table, &splits, &fields)?;
    let sizes: BTreeMap<&str, usize> = datasets.iter().map(|(k, d)| (k.as_str(), d.len())).collect();
    info!("Split datasets with sizes {sizes:?}");
    let (train, val, test) = (
        select(&datasets, SPLIT_TRAIN)?,
        select(&datasets, SPLIT_VAL)?,
        select(&datasets, SPLIT_TEST)?,
    );

    let vocab = config.word_embedding()?.provide(train)?;
    let args = ModelArgs::from_config(&config);
    info!("Built model with arguments: {args:?}");
    config.model_args = Some(args.clone());
    let mut varmap = VarMap::new();
    let model = build_model(&vocab, &args, &mut varmap, &device)?;

    info!("Running optimization");
    let params = TrainingParams::from_config(&config);
    let outcome = supervise(&model, &varmap, &vocab, train, val, Some(test), &params, &device)?;

    if let Some(dir) = &output_dir {
        save_outputs(dir, &config, &outcome, FieldsBundle::new(fields, vocab))?;
    }
    info!("Training complete");

    Ok(TrainRun { config, outcome })
}

fn save_outputs(dir: &Path, config: &ModelingConfig, outcome: &TrainingOutcome, bundle: FieldsBundle) -> Result<()> {
    for key in config.save_keys() {
        match key.as_str() {
            "fields" => {
                info!("Saving input fields definition to {}", crate::output::FIELDS_FILE);
                bundle.save(dir)?;
            }
            "history" => {
                info!("Saving history to {}", crate::output::HISTORY_FILE);
                save_history(dir, &outcome.history)?;
            }
            "config" => {
                info!("Saving config to {CONFIG_FILE}");
                config.save(dir.join(CONFIG_FILE))?;
            }
            other => warn!("Ignoring unknown save key {other:?}"),
        }
    }
    Ok(())
}

/// Label the `predict` split with the model trained into `common.output_dir`.
///
/// The stored run config is reused; only device and batch size come from
/// `common`. Predictions are written to `predictions.json` and returned.
pub fn run_predict<S: CandidateStore + ?Sized>(
    common: CommonOptions,
    splits_file: PathBuf,
    store: &S,
) -> Result<Vec<Prediction>> {
    let output_dir = common
        .output_dir
        .clone()
        .ok_or_else(|| tcre_core::TcreError::Config("prediction requires an output directory".into()))?;
    let class = CandidateClass::from_relation_class(&common.relation_class)?;

    let config_path = output_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Err(TrainError::MissingCheckpoint {
            what: CONFIG_FILE.to_string(),
            dir: output_dir,
        });
    }
    let mut config = ModelingConfig::load(&config_path)?;
    config.common.device = common.device;
    config.common.batch_size = common.batch_size;

    let device = parse_device(&config.common.device)?;
    let mut splits = Splits::load(&splits_file, Some(&PREDICTION_SPLITS[..]))?;
    let cands = resolve_candidates(store, &class, &mut splits, config.train.missing_policy)?;

    info!("Gathering predictions");
    let predictor = Predictor::load(&output_dir, &config, &device)?;
    let table = features(&config, &class, &cands)?;
    let datasets = assemble_datasets(&table, &splits, predictor.fields())?;
    let dataset = select(&datasets, SPLIT_PREDICT)?;
    let predictions = predictor.predict(dataset, config.common.batch_size)?;
    let positive = predictions.iter().filter(|p| p.y_pred > 0.5).count();
    info!("Predicted {positive} positive of {} candidates", predictions.len());

    let path = output_dir.join(PREDICTIONS_FILE);
    info!("Saving predictions to {path:?}");
    save_predictions(&path, &predictions)?;
    Ok(predictions)
}
