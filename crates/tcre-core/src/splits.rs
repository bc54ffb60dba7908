//! # Split Loader
//!
//! Reads named groups of candidate ids from a JSON object such as
//! `{"train": [1, 2, 3], "test": [3, 4]}`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TcreError};
use crate::types::CandidateId;

pub const SPLIT_TRAIN: &str = "train";
pub const SPLIT_VAL: &str = "val";
pub const SPLIT_TEST: &str = "test";
pub const SPLIT_PREDICT: &str = "predict";

/// Split names required to train.
pub const TRAINING_SPLITS: [&str; 3] = [SPLIT_TRAIN, SPLIT_VAL, SPLIT_TEST];
/// Split names required to predict.
pub const PREDICTION_SPLITS: [&str; 1] = [SPLIT_PREDICT];

/// Mapping from split name to an ordered list of candidate ids.
///
/// Ids may repeat within and across splits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Splits(BTreeMap<String, Vec<CandidateId>>);

impl Splits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a split file, keeping only the names in `keys` when given.
    pub fn load<P: AsRef<Path>>(path: P, keys: Option<&[&str]>) -> Result<Self> {
        let path = path.as_ref();
        info!("Gathering candidates for splits at {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let splits = Self::from_json(&content).map_err(|source| TcreError::SplitFormat {
            path: path.to_path_buf(),
            source,
        })?;
        let splits = match keys {
            Some(keys) => splits.filter(keys),
            None => splits,
        };
        info!("Split sizes = {:?}", splits.sizes());
        Ok(splits)
    }

    /// Parse the JSON object form.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Keep only the named splits.
    #[must_use]
    pub fn filter(self, keys: &[&str]) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|(name, _)| keys.contains(&name.as_str()))
                .collect(),
        )
    }

    /// Fail unless every name in `keys` is present.
    pub fn require(&self, keys: &[&str]) -> Result<()> {
        if keys.iter().all(|k| self.0.contains_key(*k)) {
            return Ok(());
        }
        Err(TcreError::MissingSplits {
            expected: keys.iter().map(|k| k.to_string()).collect(),
            found: self.names().map(str::to_string).collect(),
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, ids: Vec<CandidateId>) {
        self.0.insert(name.into(), ids);
    }

    pub fn get(&self, name: &str) -> Option<&[CandidateId]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CandidateId])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Per-split id counts.
    pub fn sizes(&self) -> BTreeMap<&str, usize> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.len())).collect()
    }

    /// Total number of ids over all splits, repeats included.
    pub fn total_len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Deduplicated union of ids across all splits, ascending.
    pub fn unique_ids(&self) -> Vec<CandidateId> {
        self.0
            .values()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Remove every id not in `keep` from all splits.
    pub fn retain_ids(&mut self, keep: &HashSet<CandidateId>) {
        for ids in self.0.values_mut() {
            ids.retain(|id| keep.contains(id));
        }
    }
}

impl FromIterator<(String, Vec<CandidateId>)> for Splits {
    fn from_iter<I: IntoIterator<Item = (String, Vec<CandidateId>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index_oriented_json() {
        let splits = Splits::from_json(r#"{"train":[1,2,3],"test":[3,4]}"#).unwrap();
        assert_eq!(splits.get("train"), Some(&[1, 2, 3][..]));
        assert_eq!(splits.total_len(), 5);
        assert_eq!(splits.unique_ids(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn filters_to_requested_keys() {
        let splits = Splits::from_json(r#"{"train":[1],"val":[2],"predict":[3]}"#)
            .unwrap()
            .filter(&PREDICTION_SPLITS);
        assert_eq!(splits.names().collect::<Vec<_>>(), vec!["predict"]);
    }

    #[test]
    fn require_reports_missing_keys() {
        let splits = Splits::from_json(r#"{"train":[1],"val":[2]}"#).unwrap();
        let err = splits.require(&TRAINING_SPLITS).unwrap_err();
        match err {
            TcreError::MissingSplits { found, .. } => assert_eq!(found, vec!["train", "val"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splits.json");
        std::fs::write(&path, r#"[1, 2, 3]"#).unwrap();
        assert!(matches!(
            Splits::load(&path, None),
            Err(TcreError::SplitFormat { .. })
        ));

        std::fs::write(&path, r#"{"train": ["a"]}"#).unwrap();
        assert!(matches!(
            Splits::load(&path, None),
            Err(TcreError::SplitFormat { .. })
        ));
    }

    #[test]
    fn load_applies_key_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splits.json");
        std::fs::write(&path, r#"{"train":[1,2],"val":[3],"test":[4],"extra":[5]}"#).unwrap();
        let splits = Splits::load(&path, Some(&TRAINING_SPLITS)).unwrap();
        assert!(splits.require(&TRAINING_SPLITS).is_ok());
        assert!(splits.get("extra").is_none());
    }

    #[test]
    fn retain_ids_drops_everywhere() {
        let mut splits = Splits::from_json(r#"{"train":[1,2,2],"val":[2,3]}"#).unwrap();
        splits.retain_ids(&HashSet::from([2]));
        assert_eq!(splits.get("train"), Some(&[2, 2][..]));
        assert_eq!(splits.get("val"), Some(&[2][..]));
    }
}
