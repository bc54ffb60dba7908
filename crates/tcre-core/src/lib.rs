//! # tcre Core
//!
//! Data side of the relation extraction pipeline: split files, candidate
//! resolution, entity marking, feature records, fixed-length datasets and
//! vocabularies.
//!
//! ## Quick Start
//!
//! ```rust
//! use tcre_core::{
//!     assemble_datasets, Candidate, CandidateClass, EntityMention, EntitySelection,
//!     FeatureBuilder, FieldSpec, MarkerConfig, Splits,
//! };
//!
//! let class = CandidateClass::from_relation_class("inducing_cytokine").unwrap();
//! let config = MarkerConfig::build("sngl_01", false, &class.entity_types, true).unwrap();
//! let builder = FeatureBuilder::new(&config, &class.entity_types, false, EntitySelection::CandidatesOnly);
//!
//! let cand = Candidate {
//!     id: 1,
//!     words: vec!["IL-2".into(), "activates".into(), "T".into(), "cells".into()],
//!     entities: vec![
//!         EntityMention::new("cytokine", 0, 1, true),
//!         EntityMention::new("immune_cell_type", 2, 4, true),
//!     ],
//!     label: 1.0,
//! };
//! let table = builder.build(&[cand]).unwrap();
//! let splits = Splits::from_json(r#"{"train": [1]}"#).unwrap();
//! let datasets = assemble_datasets(&table, &splits, &FieldSpec::default()).unwrap();
//!
//! assert_eq!(datasets["train"].examples()[0].text[..3], ["<", "CYTOKINE", ">"]);
//! ```
pub mod dataset;
pub mod error;
pub mod features;
pub mod markers;
pub mod splits;
pub mod store;
pub mod types;
pub mod vectors;
pub mod vocab;

// Re-export primary API
pub use dataset::{
    assemble_datasets, BatchOrder, Dataset, Example, FieldSpec, DIST_PAD_VAL, PAD_TOKEN, SEQ_LEN,
};
pub use error::{Result, TcreError};
pub use features::{EntitySelection, FeatureBuilder, FeatureTable};
pub use markers::{MarkerConfig, MarkerListName, Markers, Swaps};
pub use splits::{Splits, PREDICTION_SPLITS, SPLIT_PREDICT, SPLIT_TEST, SPLIT_TRAIN, SPLIT_VAL, TRAINING_SPLITS};
pub use store::{
    resolve_candidates, CandidateStore, MemoryCandidateStore, MissingCandidatePolicy,
    SqliteCandidateStore,
};
pub use types::{Candidate, CandidateClass, CandidateId, EntityMention, FeatureRecord};
pub use vectors::WordVectors;
pub use vocab::{EmbeddingType, Embeddings, Vocab, WordEmbedding, PAD_INDEX, UNK_INDEX};
