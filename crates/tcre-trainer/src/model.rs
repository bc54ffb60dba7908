//! # Relation Classifier
//!
//! Recurrent binary classifier over marked token sequences, optionally
//! enriched with two entity-distance embeddings, built with candle.

use std::str::FromStr;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::rnn::{self, GRUConfig, LSTMConfig, GRU, LSTM, RNN};
use candle_nn::{Dropout, Embedding, Init, Linear, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tcre_core::{CandidateId, Example, TcreError, Vocab, DIST_PAD_VAL};
use tracing::info;

use crate::config::ModelingConfig;
use crate::error::Result;

/// Variable name of the word embedding table.
const WRD_EMBEDDING: &str = "wrd_embedding";

/// Size preset controlling hidden, word embedding and position embedding widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSize {
    S,
    M,
    L,
    XL,
}

impl ModelSize {
    /// `(hidden_dim, wrd_embed_dim, pos_embed_dim)`
    pub fn dims(self) -> (usize, usize, usize) {
        match self {
            Self::S => (5, 10, 3),
            Self::M => (10, 30, 8),
            Self::L => (20, 50, 10),
            Self::XL => (30, 100, 10),
        }
    }
}

impl FromStr for ModelSize {
    type Err = TcreError;

    fn from_str(s: &str) -> std::result::Result<Self, TcreError> {
        match s {
            "S" => Ok(Self::S),
            "M" => Ok(Self::M),
            "L" => Ok(Self::L),
            "XL" => Ok(Self::XL),
            other => Err(TcreError::Config(format!("unknown model size {other:?}"))),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Recurrent cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "GRU")]
    Gru,
}

impl FromStr for CellType {
    type Err = TcreError;

    fn from_str(s: &str) -> std::result::Result<Self, TcreError> {
        match s.to_ascii_uppercase().as_str() {
            "LSTM" => Ok(Self::Lstm),
            "GRU" => Ok(Self::Gru),
            _ => Err(TcreError::Config(format!("unknown cell type {s:?}"))),
        }
    }
}

impl std::fmt::Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Lstm => "LSTM",
            Self::Gru => "GRU",
        })
    }
}

/// Resolved architecture arguments, persisted in the run config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArgs {
    pub hidden_dim: usize,
    /// Absent when the word embedding comes from external vectors.
    pub wrd_embed_dim: Option<usize>,
    /// Zero disables the distance features.
    pub pos_embed_dim: usize,
    pub dropout: f32,
    pub bidirectional: bool,
    pub cell_type: CellType,
    pub device: String,
    pub num_layers: usize,
    pub max_dist: usize,
    pub train_wrd_embed: bool,
}

impl ModelArgs {
    pub fn from_config(config: &ModelingConfig) -> Self {
        let train = &config.train;
        let (hidden_dim, wrd_embed_dim, pos_embed_dim) = train.model_size.dims();
        let embedding = train.wrd_embedding_type;
        Self {
            hidden_dim,
            wrd_embed_dim: (embedding == tcre_core::EmbeddingType::Denovo).then_some(wrd_embed_dim),
            pos_embed_dim: if train.use_positions { pos_embed_dim } else { 0 },
            dropout: train.dropout,
            bidirectional: train.bidirectional,
            cell_type: train.cell_type,
            device: config.common.device.clone(),
            num_layers: train.num_layers,
            max_dist: train.max_dist,
            train_wrd_embed: embedding == tcre_core::EmbeddingType::W2vTrained,
        }
    }

    /// Number of distance embedding slots: pad, then `[-max_dist, max_dist]`.
    pub fn dist_slots(&self) -> usize {
        2 * self.max_dist + 2
    }

    fn output_dim(&self) -> usize {
        if self.bidirectional {
            2 * self.hidden_dim
        } else {
            self.hidden_dim
        }
    }
}

/// Map a token distance to its embedding slot.
pub fn dist_index(dist: i64, max_dist: usize) -> u32 {
    if dist == DIST_PAD_VAL {
        return 0;
    }
    let max = max_dist as i64;
    (dist.clamp(-max, max) + max + 1) as u32
}

/// Device tensors for one batch.
#[derive(Debug)]
pub struct Batch {
    pub ids: Vec<CandidateId>,
    pub lengths: Vec<usize>,
    /// `(B, T)` token indices.
    pub text: Tensor,
    /// `(B, T)` distance slots relative to each entity.
    pub e0_dist: Tensor,
    pub e1_dist: Tensor,
    /// `(B,)` labels.
    pub labels: Tensor,
}

impl Batch {
    /// Numericalize examples; the time axis is cut to the longest example.
    pub fn prepare(examples: &[&Example], vocab: &Vocab, max_dist: usize, device: &Device) -> Result<Self> {
        let b = examples.len();
        let t = examples.iter().map(|e| e.length).max().unwrap_or(0).max(1);

        let mut text = Vec::with_capacity(b * t);
        let mut e0 = Vec::with_capacity(b * t);
        let mut e1 = Vec::with_capacity(b * t);
        for example in examples {
            text.extend(vocab.numericalize(&example.text[..t]));
            e0.extend(example.e0_dist[..t].iter().map(|&d| dist_index(d, max_dist)));
            e1.extend(example.e1_dist[..t].iter().map(|&d| dist_index(d, max_dist)));
        }

        Ok(Self {
            ids: examples.iter().map(|e| e.id).collect(),
            lengths: examples.iter().map(|e| e.length.max(1)).collect(),
            text: Tensor::from_vec(text, (b, t), device)?,
            e0_dist: Tensor::from_vec(e0, (b, t), device)?,
            e1_dist: Tensor::from_vec(e1, (b, t), device)?,
            labels: Tensor::from_vec(examples.iter().map(|e| e.label).collect::<Vec<f32>>(), b, device)?,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

enum Cell {
    Lstm(LSTM),
    Gru(GRU),
}

impl Cell {
    fn new(cell_type: CellType, in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(match cell_type {
            CellType::Lstm => Self::Lstm(rnn::lstm(in_dim, hidden_dim, LSTMConfig::default(), vb)?),
            CellType::Gru => Self::Gru(rnn::gru(in_dim, hidden_dim, GRUConfig::default(), vb)?),
        })
    }

    /// `(B, T, F)` -> `(B, T, H)` hidden states.
    fn run(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Lstm(cell) => cell.states_to_tensor(&cell.seq(xs)?),
            Self::Gru(cell) => cell.states_to_tensor(&cell.seq(xs)?),
        }
    }
}

struct RnnLayer {
    forward: Cell,
    backward: Option<Cell>,
}

/// Per-row time reversal of the unpadded prefix; padding stays in place.
fn reverse_index(lengths: &[usize], t: usize, device: &Device) -> candle_core::Result<Tensor> {
    let idx: Vec<u32> = lengths
        .iter()
        .flat_map(|&len| (0..t).map(move |i| if i < len { (len - 1 - i) as u32 } else { i as u32 }))
        .collect();
    Tensor::from_vec(idx, (lengths.len(), t), device)
}

/// Gather along time with a `(B, T')` index, broadcast over features.
fn gather_time(xs: &Tensor, idx: &Tensor) -> candle_core::Result<Tensor> {
    let (b, t) = idx.dims2()?;
    let features = xs.dim(2)?;
    let idx = idx.unsqueeze(2)?.broadcast_as((b, t, features))?.contiguous()?;
    xs.contiguous()?.gather(&idx, 1)
}

/// Recurrent relation classifier producing one logit per example.
pub struct RelationRnn {
    args: ModelArgs,
    wrd_embedding: Embedding,
    pos_embeddings: Option<(Embedding, Embedding)>,
    layers: Vec<RnnLayer>,
    dropout: Dropout,
    output: Linear,
}

impl RelationRnn {
    pub fn args(&self) -> &ModelArgs {
        &self.args
    }

    /// Logits of shape `(B,)`.
    pub fn forward(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let device = batch.text.device();
        let (_, t) = batch.text.dims2()?;

        let mut xs = self.wrd_embedding.forward(&batch.text)?;
        if let Some((e0, e1)) = &self.pos_embeddings {
            let p0 = e0.forward(&batch.e0_dist)?;
            let p1 = e1.forward(&batch.e1_dist)?;
            xs = Tensor::cat(&[&xs, &p0, &p1], 2)?;
        }
        xs = self.dropout.forward(&xs, train)?;

        let rev = reverse_index(&batch.lengths, t, device)?;
        let mut last_backward = None;
        let mut last_forward = xs.clone();
        for layer in &self.layers {
            let fwd = layer.forward.run(&xs)?;
            xs = match &layer.backward {
                Some(cell) => {
                    let bwd = gather_time(&cell.run(&gather_time(&xs, &rev)?)?, &rev)?;
                    let out = Tensor::cat(&[&fwd, &bwd], 2)?;
                    last_backward = Some(bwd);
                    out
                }
                None => fwd.clone(),
            };
            last_forward = fwd;
        }

        let last: Vec<u32> = batch.lengths.iter().map(|&len| (len - 1) as u32).collect();
        let last = Tensor::from_vec(last, (batch.len(), 1), device)?;
        let mut hidden = gather_time(&last_forward, &last)?.squeeze(1)?;
        if let Some(bwd) = last_backward {
            hidden = Tensor::cat(&[&hidden, &bwd.narrow(1, 0, 1)?.squeeze(1)?], 1)?;
        }

        let hidden = self.dropout.forward(&hidden, train)?;
        Ok(self.output.forward(&hidden)?.squeeze(1)?)
    }

    /// Hard 0/1 predictions (sigmoid probability rounded half to even).
    pub fn predict(&self, batch: &Batch) -> Result<Vec<f32>> {
        let logits = self.forward(batch, false)?.to_vec1::<f32>()?;
        Ok(logits.into_iter().map(|l| if l > 0.0 { 1.0 } else { 0.0 }).collect())
    }
}

/// Build the classifier, registering trainable variables in `varmap`.
///
/// External vectors come from `vocab`; they are frozen constants unless
/// `train_wrd_embed` is set, in which case they seed a trainable variable.
pub fn build_model(vocab: &Vocab, args: &ModelArgs, varmap: &mut VarMap, device: &Device) -> Result<RelationRnn> {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, device);

    let (wrd_embedding, wrd_dim, pretrained) = match (vocab.vectors(), args.wrd_embed_dim) {
        (Some(vectors), _) => {
            let table = Tensor::from_vec(vectors.data.clone(), (vocab.len(), vectors.dim), device)?;
            if args.train_wrd_embed {
                let weight = vb.pp(WRD_EMBEDDING).get_with_hints(
                    (vocab.len(), vectors.dim),
                    "weight",
                    Init::Const(0.0),
                )?;
                (Embedding::new(weight, vectors.dim), vectors.dim, Some(table))
            } else {
                (Embedding::new(table, vectors.dim), vectors.dim, None)
            }
        }
        (None, Some(dim)) => (candle_nn::embedding(vocab.len(), dim, vb.pp(WRD_EMBEDDING))?, dim, None),
        (None, None) => {
            return Err(TcreError::Config(
                "word embedding dimension is required when no pretrained vectors are loaded".into(),
            )
            .into());
        }
    };

    let pos_embeddings = if args.pos_embed_dim > 0 {
        Some((
            candle_nn::embedding(args.dist_slots(), args.pos_embed_dim, vb.pp("e0_embedding"))?,
            candle_nn::embedding(args.dist_slots(), args.pos_embed_dim, vb.pp("e1_embedding"))?,
        ))
    } else {
        None
    };

    let mut in_dim = wrd_dim + 2 * args.pos_embed_dim;
    let mut layers = Vec::with_capacity(args.num_layers);
    for i in 0..args.num_layers {
        let vb = vb.pp(format!("rnn.l{i}"));
        layers.push(RnnLayer {
            forward: Cell::new(args.cell_type, in_dim, args.hidden_dim, vb.pp("fwd"))?,
            backward: if args.bidirectional {
                Some(Cell::new(args.cell_type, in_dim, args.hidden_dim, vb.pp("bwd"))?)
            } else {
                None
            },
        });
        in_dim = args.output_dim();
    }

    let output = candle_nn::linear(args.output_dim(), 1, vb.pp("output"))?;

    if let Some(table) = pretrained {
        varmap.set_one(format!("{WRD_EMBEDDING}.weight"), &table)?;
    }

    info!(
        "Built {} model with {} trainable variables (vocab size {}, input dim {})",
        args.cell_type,
        varmap.all_vars().len(),
        vocab.len(),
        wrd_dim + 2 * args.pos_embed_dim
    );

    Ok(RelationRnn {
        args: args.clone(),
        wrd_embedding,
        pos_embeddings,
        layers,
        dropout: Dropout::new(args.dropout),
        output,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tcre_core::{Embeddings, FeatureRecord, FieldSpec};

    pub(crate) fn args(cell_type: CellType, bidirectional: bool) -> ModelArgs {
        ModelArgs {
            hidden_dim: 4,
            wrd_embed_dim: Some(6),
            pos_embed_dim: 2,
            dropout: 0.0,
            bidirectional,
            cell_type,
            device: "cpu".into(),
            num_layers: 2,
            max_dist: 3,
            train_wrd_embed: false,
        }
    }

    fn example(id: i64, text: &[&str]) -> Example {
        let n = text.len() as i64;
        FieldSpec::default().example(&FeatureRecord {
            id,
            text: text.iter().map(|t| t.to_string()).collect(),
            label: (id % 2) as f32,
            e0_dist: (0..n).collect(),
            e1_dist: (-n..0).collect(),
        })
    }

    fn vocab() -> Vocab {
        Vocab::from_tokens(["a", "b", "c"].map(String::from))
    }

    #[test]
    fn dist_slots_clamp_and_reserve_pad() {
        assert_eq!(dist_index(DIST_PAD_VAL, 50), 0);
        assert_eq!(dist_index(-50, 50), 1);
        assert_eq!(dist_index(0, 50), 51);
        assert_eq!(dist_index(50, 50), 101);
        assert_eq!(dist_index(-500, 50), 1);
        assert_eq!(dist_index(500, 50), 101);
    }

    #[test]
    fn presets_follow_size() {
        assert_eq!(ModelSize::XL.dims(), (30, 100, 10));
        assert_eq!("M".parse::<ModelSize>().unwrap(), ModelSize::M);
        assert_eq!("gru".parse::<CellType>().unwrap(), CellType::Gru);
        assert!("XXL".parse::<ModelSize>().is_err());
    }

    #[test]
    fn batch_is_cut_to_longest_example() {
        let a = example(1, &["a", "b"]);
        let b = example(2, &["a", "b", "c", "zzz"]);
        let batch = Batch::prepare(&[&a, &b], &vocab(), 3, &Device::Cpu).unwrap();
        assert_eq!(batch.text.dims2().unwrap(), (2, 4));
        assert_eq!(batch.lengths, vec![2, 4]);
        let text = batch.text.to_vec2::<u32>().unwrap();
        assert_eq!(text[0], vec![2, 3, 1, 1]);
        assert_eq!(text[1][3], 0);
        let e0 = batch.e0_dist.to_vec2::<u32>().unwrap();
        assert_eq!(e0[0], vec![4, 5, 0, 0]);
    }

    #[test]
    fn reverse_index_keeps_padding() {
        let idx = reverse_index(&[2, 3], 4, &Device::Cpu).unwrap();
        assert_eq!(idx.to_vec2::<u32>().unwrap(), vec![vec![1, 0, 2, 3], vec![2, 1, 0, 3]]);
    }

    #[test]
    fn forward_yields_one_logit_per_example() {
        for (cell, bidirectional) in [(CellType::Lstm, false), (CellType::Gru, true)] {
            let mut varmap = VarMap::new();
            let model = build_model(&vocab(), &args(cell, bidirectional), &mut varmap, &Device::Cpu).unwrap();
            let a = example(1, &["a", "b"]);
            let b = example(2, &["c", "b", "a"]);
            let batch = Batch::prepare(&[&a, &b], &vocab(), 3, &Device::Cpu).unwrap();
            assert_eq!(model.forward(&batch, true).unwrap().dims(), &[2]);
            let preds = model.predict(&batch).unwrap();
            assert!(preds.iter().all(|p| *p == 0.0 || *p == 1.0));
        }
    }

    #[test]
    fn padding_does_not_change_predictions() {
        let mut varmap = VarMap::new();
        let model = build_model(&vocab(), &args(CellType::Lstm, true), &mut varmap, &Device::Cpu).unwrap();
        let short = example(1, &["a", "b"]);
        let long = example(2, &["c", "b", "a", "a", "b"]);
        let alone = Batch::prepare(&[&short], &vocab(), 3, &Device::Cpu).unwrap();
        let padded = Batch::prepare(&[&short, &long], &vocab(), 3, &Device::Cpu).unwrap();
        let x = model.forward(&alone, false).unwrap().to_vec1::<f32>().unwrap();
        let y = model.forward(&padded, false).unwrap().to_vec1::<f32>().unwrap();
        assert!((x[0] - y[0]).abs() < 1e-5);
    }

    #[test]
    fn frozen_vectors_stay_out_of_the_varmap() {
        let mut vocab = vocab();
        vocab
            .set_vectors(Embeddings {
                dim: 2,
                data: (0..10).map(|v| v as f32).collect(),
            })
            .unwrap();
        let mut frozen = args(CellType::Lstm, false);
        frozen.wrd_embed_dim = None;

        let mut varmap = VarMap::new();
        build_model(&vocab, &frozen, &mut varmap, &Device::Cpu).unwrap();
        assert!(!varmap.data().lock().unwrap().contains_key("wrd_embedding.weight"));

        let mut trained = frozen.clone();
        trained.train_wrd_embed = true;
        let mut varmap = VarMap::new();
        build_model(&vocab, &trained, &mut varmap, &Device::Cpu).unwrap();
        let data = varmap.data().lock().unwrap();
        let weight = data["wrd_embedding.weight"].as_tensor().to_vec2::<f32>().unwrap();
        assert_eq!(weight[4], vec![8.0, 9.0]);
    }
}
