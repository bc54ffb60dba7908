//! # Candidate Resolver
//!
//! Bulk-fetches candidate objects for every id referenced by a split mapping.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TcreError};
use crate::splits::Splits;
use crate::types::{Candidate, CandidateClass, CandidateId};

pub use memory::MemoryCandidateStore;
pub use sqlite::SqliteCandidateStore;

/// Read-only access to externally owned candidates.
pub trait CandidateStore {
    /// Fetch candidates of `class` with the given ids in one call.
    ///
    /// Ids without a stored candidate are simply absent from the result.
    fn fetch(&self, class: &CandidateClass, ids: &[CandidateId]) -> Result<Vec<Candidate>>;
}

/// What to do when the store returns fewer candidates than requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCandidatePolicy {
    /// Abort with [`TcreError::MissingCandidates`].
    #[default]
    Fail,
    /// Warn and remove the missing ids from every split.
    Drop,
}

impl FromStr for MissingCandidatePolicy {
    type Err = TcreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail" => Ok(Self::Fail),
            "drop" => Ok(Self::Drop),
            other => Err(TcreError::Config(format!(
                "missing candidate policy must be \"fail\" or \"drop\", got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for MissingCandidatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Fetch the union of all split ids and reconcile missing ones per `policy`.
///
/// With [`MissingCandidatePolicy::Drop`], `splits` is updated in place so the
/// dataset assembler never sees an unresolved id.
pub fn resolve_candidates<S: CandidateStore + ?Sized>(
    store: &S,
    class: &CandidateClass,
    splits: &mut Splits,
    policy: MissingCandidatePolicy,
) -> Result<Vec<Candidate>> {
    let ids = splits.unique_ids();
    let cands = store.fetch(class, &ids)?;
    info!("Found {} candidates", cands.len());

    let found: HashSet<CandidateId> = cands.iter().map(|c| c.id).collect();
    let missing: Vec<CandidateId> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
    if missing.is_empty() {
        return Ok(cands);
    }

    match policy {
        MissingCandidatePolicy::Fail => Err(TcreError::MissingCandidates {
            requested: ids.len(),
            found: found.len(),
            missing: missing.into_iter().take(10).collect(),
        }),
        MissingCandidatePolicy::Drop => {
            warn!(
                "Dropping {} of {} requested candidate ids not present in the store (first: {:?})",
                missing.len(),
                ids.len(),
                &missing[..missing.len().min(10)]
            );
            splits.retain_ids(&found);
            Ok(cands)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityMention, ENT_TYP_CK, ENT_TYP_CT};

    fn candidate(id: CandidateId) -> Candidate {
        Candidate {
            id,
            words: vec!["IL-2".into(), "activates".into(), "T-cells".into()],
            entities: vec![
                EntityMention::new(ENT_TYP_CK, 0, 1, true),
                EntityMention::new(ENT_TYP_CT, 2, 3, true),
            ],
            label: 1.0,
        }
    }

    fn store() -> (MemoryCandidateStore, CandidateClass) {
        let class = CandidateClass::from_relation_class("inducing_cytokine").unwrap();
        let store = MemoryCandidateStore::from_candidates(&class, [1, 2, 3].map(candidate));
        (store, class)
    }

    #[test]
    fn fetches_union_once() {
        let (store, class) = store();
        let mut splits = Splits::from_json(r#"{"train":[1,2,2],"val":[2,3]}"#).unwrap();
        let cands = resolve_candidates(&store, &class, &mut splits, MissingCandidatePolicy::Fail).unwrap();
        assert_eq!(cands.len(), 3);
        assert_eq!(splits.total_len(), 5);
    }

    #[test]
    fn fail_policy_reports_missing() {
        let (store, class) = store();
        let mut splits = Splits::from_json(r#"{"train":[1,2],"val":[7]}"#).unwrap();
        let err = resolve_candidates(&store, &class, &mut splits, MissingCandidatePolicy::Fail).unwrap_err();
        match err {
            TcreError::MissingCandidates { requested, found, missing } => {
                assert_eq!((requested, found), (3, 2));
                assert_eq!(missing, vec![7]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn drop_policy_prunes_splits() {
        let (store, class) = store();
        let mut splits = Splits::from_json(r#"{"train":[1,9],"val":[7,3]}"#).unwrap();
        let cands = resolve_candidates(&store, &class, &mut splits, MissingCandidatePolicy::Drop).unwrap();
        assert_eq!(cands.len(), 2);
        assert_eq!(splits.get("train"), Some(&[1][..]));
        assert_eq!(splits.get("val"), Some(&[3][..]));
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("drop".parse::<MissingCandidatePolicy>().unwrap(), MissingCandidatePolicy::Drop);
        assert!("ignore".parse::<MissingCandidatePolicy>().is_err());
    }
}
