use std::collections::HashMap;

use crate::error::Result;
use crate::types::{Candidate, CandidateClass, CandidateId};

use super::CandidateStore;

/// Candidate store held in memory, keyed by relation class then id.
#[derive(Debug, Clone, Default)]
pub struct MemoryCandidateStore {
    classes: HashMap<String, HashMap<CandidateId, Candidate>>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_candidates(class: &CandidateClass, cands: impl IntoIterator<Item = Candidate>) -> Self {
        let mut store = Self::new();
        for cand in cands {
            store.insert(class, cand);
        }
        store
    }

    /// Insert or replace a candidate.
    pub fn insert(&mut self, class: &CandidateClass, cand: Candidate) {
        self.classes
            .entry(class.relation_class.clone())
            .or_default()
            .insert(cand.id, cand);
    }
}

impl CandidateStore for MemoryCandidateStore {
    fn fetch(&self, class: &CandidateClass, ids: &[CandidateId]) -> Result<Vec<Candidate>> {
        let Some(cands) = self.classes.get(&class.relation_class) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| cands.get(id).cloned()).collect())
    }
}
