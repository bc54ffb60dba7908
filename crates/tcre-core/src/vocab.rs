//! # Vocabulary Provider
//!
//! Token-to-index mappings, either wrapped around pretrained word vectors or
//! learned from the training split alone.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{Dataset, PAD_TOKEN};
use crate::error::{Result, TcreError};
use crate::vectors::WordVectors;

pub const UNK_TOKEN: &str = "<unk>";
pub const UNK_INDEX: u32 = 0;
pub const PAD_INDEX: u32 = 1;

/// Word embedding type tag as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingType {
    W2vFrozen,
    W2vTrained,
    Denovo,
}

impl EmbeddingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W2vFrozen => "w2v_frozen",
            Self::W2vTrained => "w2v_trained",
            Self::Denovo => "denovo",
        }
    }
}

impl FromStr for EmbeddingType {
    type Err = TcreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "w2v_frozen" => Ok(Self::W2vFrozen),
            "w2v_trained" => Ok(Self::W2vTrained),
            "denovo" => Ok(Self::Denovo),
            other => Err(TcreError::InvalidEmbeddingType(other.to_string())),
        }
    }
}

impl std::fmt::Display for EmbeddingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved word embedding source, carrying what each mode needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordEmbedding {
    /// Pretrained vectors kept fixed during training.
    FrozenExternal { path: PathBuf, vocab_limit: usize },
    /// Pretrained vectors updated during training.
    TrainableExternal { path: PathBuf, vocab_limit: usize },
    /// Vocabulary and embeddings learned from the training split.
    Learned,
}

impl WordEmbedding {
    /// Resolve a type tag; external modes require a vector file path.
    pub fn resolve(kind: EmbeddingType, path: Option<PathBuf>, vocab_limit: usize) -> Result<Self> {
        let external = || {
            path.clone().ok_or_else(|| {
                TcreError::Config(format!("embedding type {kind} requires a word vector file"))
            })
        };
        Ok(match kind {
            EmbeddingType::W2vFrozen => Self::FrozenExternal {
                path: external()?,
                vocab_limit,
            },
            EmbeddingType::W2vTrained => Self::TrainableExternal {
                path: external()?,
                vocab_limit,
            },
            EmbeddingType::Denovo => Self::Learned,
        })
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, Self::Learned)
    }

    pub fn is_trainable(&self) -> bool {
        !matches!(self, Self::FrozenExternal { .. })
    }

    /// Build the vocabulary for this source.
    ///
    /// `train` is the training split dataset; other splits are never consulted.
    pub fn provide(&self, train: &Dataset) -> Result<Vocab> {
        match self {
            Self::FrozenExternal { path, vocab_limit } | Self::TrainableExternal { path, vocab_limit } => {
                Ok(Vocab::from_vectors(WordVectors::load(path, *vocab_limit)?))
            }
            Self::Learned => Ok(Vocab::build_from_dataset(train)),
        }
    }
}

/// Pretrained embedding table aligned with a vocabulary (row `i` is token `i`).
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub dim: usize,
    pub data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct VocabRepr {
    itos: Vec<String>,
}

/// Token to index mapping with `<unk>` at 0 and `<pad>` at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VocabRepr", into = "VocabRepr")]
pub struct Vocab {
    itos: Vec<String>,
    stoi: HashMap<String, u32>,
    vectors: Option<Embeddings>,
}

impl From<VocabRepr> for Vocab {
    fn from(repr: VocabRepr) -> Self {
        Self::from_tokens(repr.itos)
    }
}

impl From<Vocab> for VocabRepr {
    fn from(vocab: Vocab) -> Self {
        Self { itos: vocab.itos }
    }
}

impl Vocab {
    /// Build from an ordered token list; the specials are prepended when absent.
    pub fn from_tokens(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut vocab = Self {
            itos: Vec::new(),
            stoi: HashMap::new(),
            vectors: None,
        };
        vocab.push(UNK_TOKEN.to_string());
        vocab.push(PAD_TOKEN.to_string());
        for token in tokens {
            vocab.push(token);
        }
        vocab
    }

    fn push(&mut self, token: String) -> bool {
        if self.stoi.contains_key(&token) {
            return false;
        }
        self.stoi.insert(token.clone(), self.itos.len() as u32);
        self.itos.push(token);
        true
    }

    /// Wrap pretrained vectors; `<unk>` and `<pad>` get zero vectors.
    pub fn from_vectors(vectors: WordVectors) -> Self {
        let dim = vectors.dim;
        let mut vocab = Self::from_tokens(std::iter::empty());
        let mut data = vec![0.0; 2 * dim];
        for (i, word) in vectors.words.iter().enumerate() {
            if vocab.push(word.clone()) {
                data.extend_from_slice(vectors.row(i));
            }
        }
        vocab.vectors = Some(Embeddings { dim, data });
        vocab
    }

    /// Learn a vocabulary from a dataset's unpadded tokens, most frequent
    /// first with ties broken lexicographically.
    pub fn build_from_dataset(dataset: &Dataset) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for example in dataset.examples() {
            for token in &example.text[..example.length] {
                *counts.entry(token.as_str()).or_default() += 1;
            }
        }
        let mut tokens: Vec<(&str, usize)> = counts.into_iter().collect();
        tokens.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

        let vocab = Self::from_tokens(tokens.into_iter().map(|(t, _)| t.to_string()));
        info!("Built vocabulary of {} tokens from split {:?}", vocab.len(), dataset.name());
        vocab
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.itos
    }

    /// Index of a token, `<unk>` when absent.
    pub fn index(&self, token: &str) -> u32 {
        self.stoi.get(token).copied().unwrap_or(UNK_INDEX)
    }

    pub fn numericalize(&self, tokens: &[String]) -> Vec<u32> {
        tokens.iter().map(|t| self.index(t)).collect()
    }

    pub fn vectors(&self) -> Option<&Embeddings> {
        self.vectors.as_ref()
    }

    /// Attach a pretrained table; its row count must equal the vocabulary size.
    pub fn set_vectors(&mut self, vectors: Embeddings) -> Result<()> {
        if vectors.dim == 0 || vectors.data.len() != vectors.dim * self.len() {
            return Err(TcreError::Vectors(format!(
                "embedding table of {} values does not fit {} tokens of dimension {}",
                vectors.data.len(),
                self.len(),
                vectors.dim
            )));
        }
        self.vectors = Some(vectors);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{assemble_datasets, FieldSpec};
    use crate::features::FeatureTable;
    use crate::splits::Splits;
    use crate::types::FeatureRecord;

    fn table(val_text: &[&str]) -> FeatureTable {
        let record = |id, text: &[&str]| FeatureRecord {
            id,
            text: text.iter().map(|t| t.to_string()).collect(),
            label: 1.0,
            e0_dist: vec![0; text.len()],
            e1_dist: vec![0; text.len()],
        };
        [
            record(1, &["il-2", "induces", "th1"]),
            record(2, &["il-4", "induces", "th2"]),
            record(3, val_text),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn denovo_vocab_ignores_other_splits() {
        let splits = Splits::from_json(r#"{"train":[1,2],"val":[3],"test":[3],"predict":[3]}"#).unwrap();
        let build = |val_text: &[&str]| {
            let datasets = assemble_datasets(&table(val_text), &splits, &FieldSpec::default()).unwrap();
            Vocab::build_from_dataset(&datasets["train"])
        };
        let a = build(&["alpha", "beta"]);
        let b = build(&["gamma", "il-2", "delta", "delta"]);
        assert_eq!(a, b);
        assert_eq!(a.index("gamma"), UNK_INDEX);
    }

    #[test]
    fn denovo_orders_by_frequency_then_token() {
        let splits = Splits::from_json(r#"{"train":[1,2]}"#).unwrap();
        let datasets = assemble_datasets(&table(&["x"]), &splits, &FieldSpec::default()).unwrap();
        let vocab = Vocab::build_from_dataset(&datasets["train"]);
        assert_eq!(
            vocab.tokens(),
            &["<unk>", "<pad>", "induces", "il-2", "il-4", "th1", "th2"]
        );
        assert_eq!(vocab.index(PAD_TOKEN), PAD_INDEX);
    }

    #[test]
    fn wraps_pretrained_vectors() {
        let vectors = WordVectors {
            words: vec!["cell".into(), "tf".into()],
            dim: 2,
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        let vocab = Vocab::from_vectors(vectors);
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.index("tf"), 3);
        let table = vocab.vectors().unwrap();
        assert_eq!(&table.data[..4], &[0.0; 4]);
        assert_eq!(&table.data[6..], &[3.0, 4.0]);
    }

    #[test]
    fn serializes_tokens_only() {
        let vocab = Vocab::from_tokens(["a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&vocab).unwrap();
        let back: Vocab = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index("b"), 3);
        assert!(back.vectors().is_none());
    }

    #[test]
    fn embedding_tags() {
        assert_eq!("w2v_trained".parse::<EmbeddingType>().unwrap(), EmbeddingType::W2vTrained);
        assert!(matches!(
            "glove".parse::<EmbeddingType>(),
            Err(TcreError::InvalidEmbeddingType(_))
        ));
        assert!(WordEmbedding::resolve(EmbeddingType::W2vFrozen, None, 10).is_err());
        let learned = WordEmbedding::resolve(EmbeddingType::Denovo, None, 10).unwrap();
        assert!(!learned.is_external());
        assert!(learned.is_trainable());
    }
}
