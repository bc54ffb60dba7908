//! # Dataset Assembler
//!
//! Joins feature rows to split membership and builds one fixed-length,
//! batchable dataset per split.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TcreError};
use crate::features::FeatureTable;
use crate::splits::Splits;
use crate::types::{CandidateId, FeatureRecord};

/// Fixed sequence length every example is padded or truncated to.
pub const SEQ_LEN: usize = 128;

/// Distance value used for padding positions; never a real distance.
pub const DIST_PAD_VAL: i64 = i64::MIN;

/// Text padding token.
pub const PAD_TOKEN: &str = "<pad>";

/// Length normalization applied to every example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub seq_len: usize,
    pub dist_pad: i64,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            seq_len: SEQ_LEN,
            dist_pad: DIST_PAD_VAL,
        }
    }
}

impl FieldSpec {
    /// Pad or truncate a feature record to `seq_len`.
    pub fn example(&self, record: &FeatureRecord) -> Example {
        let length = record.len().min(self.seq_len);
        Example {
            id: record.id,
            text: fix_length(&record.text, self.seq_len, PAD_TOKEN.to_string()),
            length,
            label: record.label,
            e0_dist: fix_length(&record.e0_dist, self.seq_len, self.dist_pad),
            e1_dist: fix_length(&record.e1_dist, self.seq_len, self.dist_pad),
        }
    }
}

fn fix_length<T: Clone>(values: &[T], len: usize, pad: T) -> Vec<T> {
    let mut out: Vec<T> = values.iter().take(len).cloned().collect();
    out.resize(len, pad);
    out
}

/// One fixed-length row of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: CandidateId,
    /// Tokens padded with [`PAD_TOKEN`].
    pub text: Vec<String>,
    /// Unpadded token count, capped at the sequence length.
    pub length: usize,
    pub label: f32,
    pub e0_dist: Vec<i64>,
    pub e1_dist: Vec<i64>,
}

/// Order in which a dataset is cut into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrder {
    /// Dataset order.
    Sequential,
    /// Ascending length (stable), then chunked.
    ByLength,
    /// Length-bucketed batches visited in a seeded random order.
    Shuffled { seed: u64 },
}

/// Ordered rows for one split.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    name: String,
    examples: Vec<Example>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, examples: Vec<Example>) -> Self {
        Self {
            name: name.into(),
            examples,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Lazily iterate batches of at most `batch_size` examples.
    ///
    /// Each call starts a fresh single pass over the dataset.
    pub fn batches(&self, batch_size: usize, order: BatchOrder) -> Batches<'_> {
        let batch_size = batch_size.max(1);
        let mut indices: Vec<usize> = (0..self.examples.len()).collect();
        if !matches!(order, BatchOrder::Sequential) {
            indices.sort_by_key(|&i| self.examples[i].length);
        }

        let mut starts: Vec<usize> = (0..indices.len()).step_by(batch_size).collect();
        if let BatchOrder::Shuffled { seed } = order {
            shuffle(&mut starts, seed);
        }

        Batches {
            dataset: self,
            indices,
            starts: starts.into_iter(),
            batch_size,
        }
    }
}

/// Iterator over dataset batches.
pub struct Batches<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
    starts: std::vec::IntoIter<usize>,
    batch_size: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Vec<&'a Example>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.starts.next()?;
        let end = (start + self.batch_size).min(self.indices.len());
        Some(
            self.indices[start..end]
                .iter()
                .map(|&i| &self.dataset.examples[i])
                .collect(),
        )
    }
}

/// Fisher-Yates shuffle driven by a seeded `oorandom` generator.
fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut rng = oorandom::Rand64::new(u128::from(seed));
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..i as u64 + 1) as usize;
        items.swap(i, j);
    }
}

/// Build one dataset per split name.
///
/// A candidate listed in several splits (or several times in one) yields one
/// independent row per listing. Splits with no ids produce no dataset.
/// Fails with [`TcreError::LabelOutOfRange`] if any row's label lies outside `[0, 1]`.
pub fn assemble_datasets(
    table: &FeatureTable,
    splits: &Splits,
    fields: &FieldSpec,
) -> Result<BTreeMap<String, Dataset>> {
    table.validate_labels()?;
    info!("Initializing batch iterators");
    let mut datasets = BTreeMap::new();
    for (split, ids) in splits.iter() {
        let examples = ids
            .iter()
            .map(|&id| {
                table
                    .get(id)
                    .map(|record| fields.example(record))
                    .ok_or_else(|| TcreError::UnknownCandidate {
                        split: split.to_string(),
                        id,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        if !examples.is_empty() {
            datasets.insert(split.to_string(), Dataset::new(split, examples));
        }
    }
    Ok(datasets)
}
