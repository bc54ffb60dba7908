use serde::{Deserialize, Serialize};

use crate::error::{Result, TcreError};

/// Integer identifier of a candidate in the labeling store.
pub type CandidateId = i64;

/// Entity type label for immune cell types.
pub const ENT_TYP_CT: &str = "immune_cell_type";
/// Entity type label for cytokines.
pub const ENT_TYP_CK: &str = "cytokine";
/// Entity type label for transcription factors.
pub const ENT_TYP_TF: &str = "transcription_factor";

/// An entity mention inside a candidate's sentence.
///
/// Spans are word offsets into [`Candidate::words`], end exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    /// Entity type label (e.g. `"cytokine"`).
    #[serde(rename = "type")]
    pub entity_type: String,
    /// First word of the mention.
    pub word_start: usize,
    /// One past the last word of the mention.
    pub word_end: usize,
    /// `true` for the two mentions the candidate relates.
    pub is_candidate: bool,
}

impl EntityMention {
    pub fn new(entity_type: impl Into<String>, word_start: usize, word_end: usize, is_candidate: bool) -> Self {
        Self {
            entity_type: entity_type.into(),
            word_start,
            word_end,
            is_candidate,
        }
    }

    /// Returns `true` if the two mentions share at least one word.
    pub fn overlaps(&self, other: &EntityMention) -> bool {
        self.word_start < other.word_end && other.word_start < self.word_end
    }
}

/// An entity-pair mention in a sentence, the unit being classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Store identifier.
    pub id: CandidateId,
    /// Sentence words.
    pub words: Vec<String>,
    /// Every tagged entity mention in the sentence.
    pub entities: Vec<EntityMention>,
    /// Gold or marginal label in `[0, 1]`.
    pub label: f32,
}

impl Candidate {
    /// Text of a mention as space-joined words.
    pub fn mention_text(&self, mention: &EntityMention) -> String {
        let end = mention.word_end.min(self.words.len());
        let start = mention.word_start.min(end);
        self.words[start..end].join(" ")
    }

    /// The `is_candidate` mention of the given type.
    pub fn candidate_mention(&self, entity_type: &str) -> Result<&EntityMention> {
        self.entities
            .iter()
            .find(|e| e.is_candidate && e.entity_type == entity_type)
            .ok_or_else(|| TcreError::MissingEntity {
                candidate: self.id,
                entity_type: entity_type.to_string(),
            })
    }
}

/// Relation type descriptor: storage namespace plus the ordered entity type pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateClass {
    /// Relation class identifier, also the storage namespace.
    pub relation_class: String,
    /// Ordered entity types `(e0, e1)`.
    pub entity_types: [String; 2],
}

/// Known relation classes and their entity type pairs.
const CANDIDATE_CLASSES: &[(&str, [&str; 2])] = &[
    ("inducing_cytokine", [ENT_TYP_CK, ENT_TYP_CT]),
    ("secreted_cytokine", [ENT_TYP_CK, ENT_TYP_CT]),
    ("inducing_transcription_factor", [ENT_TYP_TF, ENT_TYP_CT]),
];

impl CandidateClass {
    /// Look up the candidate class for a relation class identifier.
    pub fn from_relation_class(relation_class: &str) -> Result<Self> {
        CANDIDATE_CLASSES
            .iter()
            .find(|(name, _)| *name == relation_class)
            .map(|(name, [t0, t1])| Self {
                relation_class: (*name).to_string(),
                entity_types: [(*t0).to_string(), (*t1).to_string()],
            })
            .ok_or_else(|| TcreError::UnknownRelationClass(relation_class.to_string()))
    }

    /// Identifiers of every known relation class.
    pub fn known() -> impl Iterator<Item = &'static str> {
        CANDIDATE_CLASSES.iter().map(|(name, _)| *name)
    }
}
