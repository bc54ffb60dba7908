//! # Feature Builder
//!
//! Turns candidates into marked token sequences with distance features.
//!
//! For each candidate the sentence words are split on whitespace, marker
//! tokens are inserted around the selected entity mentions, candidate
//! mention text is optionally replaced by a canonical type token, tokens are
//! optionally lowercased, and two per-token distance sequences are computed
//! against the marked spans of the two candidate mentions.

pub mod distance;

use std::collections::HashMap;

use tracing::{info, warn};

use crate::error::{Result, TcreError};
use crate::markers::MarkerConfig;
use crate::types::{Candidate, CandidateId, EntityMention, FeatureRecord};

pub use distance::{distances, Span};

/// Which entity mentions receive markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySelection {
    /// Only the two candidate mentions.
    CandidatesOnly,
    /// Every mention whose type is one of the candidate's entity types.
    AllOfTypes,
}

impl EntitySelection {
    /// Selection implied by the secondary-marker flag.
    pub fn for_secondary(use_secondary: bool) -> Self {
        if use_secondary {
            Self::AllOfTypes
        } else {
            Self::CandidatesOnly
        }
    }

    fn selects(self, mention: &EntityMention, entity_types: &[String; 2]) -> bool {
        let typed = entity_types.contains(&mention.entity_type);
        match self {
            Self::CandidatesOnly => typed && mention.is_candidate,
            Self::AllOfTypes => typed,
        }
    }
}

/// Builds [`FeatureRecord`]s from candidates.
#[derive(Debug, Clone)]
pub struct FeatureBuilder<'a> {
    config: &'a MarkerConfig,
    entity_types: &'a [String; 2],
    lower: bool,
    selection: EntitySelection,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(
        config: &'a MarkerConfig,
        entity_types: &'a [String; 2],
        lower: bool,
        selection: EntitySelection,
    ) -> Self {
        Self {
            config,
            entity_types,
            lower,
            selection,
        }
    }

    /// Build the feature record for one candidate.
    ///
    /// The label is copied as-is; range validation happens in [`Self::build`].
    pub fn record(&self, cand: &Candidate) -> Result<FeatureRecord> {
        let [typ0, typ1] = self.entity_types;
        let e0 = cand.candidate_mention(typ0)?;
        let e1 = cand.candidate_mention(typ1)?;

        // Candidate mentions first so they win over overlapping secondaries.
        let mut marked: Vec<(&EntityMention, bool)> = vec![(e0, true)];
        if !e1.overlaps(e0) {
            marked.push((e1, true));
        }
        for mention in &cand.entities {
            if mention.is_candidate || !self.selection.selects(mention, self.entity_types) {
                continue;
            }
            if !self.config.markers.secondary.contains_key(&mention.entity_type) {
                continue;
            }
            if marked.iter().all(|(m, _)| !m.overlaps(mention)) {
                marked.push((mention, false));
            }
        }
        for (mention, _) in &marked {
            if mention.word_start > mention.word_end || mention.word_end > cand.words.len() {
                return Err(TcreError::InvalidSpan {
                    candidate: cand.id,
                    entity_type: mention.entity_type.clone(),
                    start: mention.word_start,
                    end: mention.word_end,
                    words: cand.words.len(),
                });
            }
        }
        marked.sort_by_key(|(m, _)| m.word_start);

        let mut text = Vec::with_capacity(cand.words.len() + 4 * marked.len());
        let (mut s0, mut s1) = (None, None);
        let mut next = marked.iter().peekable();
        let mut i = 0;

        while i < cand.words.len() {
            let Some(&&(mention, primary)) = next.peek().filter(|(m, _)| m.word_start == i) else {
                self.push_word(&mut text, &cand.words[i]);
                i += 1;
                continue;
            };
            next.next();

            let markers = if primary {
                &self.config.markers.primary
            } else {
                &self.config.markers.secondary
            };
            let [open, close] = markers.get(&mention.entity_type).ok_or_else(|| {
                TcreError::Config(format!("no markers for entity type {:?}", mention.entity_type))
            })?;

            let start = text.len();
            self.push_word(&mut text, open);
            let swap = self
                .config
                .swaps
                .as_ref()
                .filter(|_| primary)
                .and_then(|swaps| swaps.get(&mention.entity_type));
            match swap {
                Some(token) => self.push_word(&mut text, token),
                None => {
                    for word in &cand.words[i..mention.word_end] {
                        self.push_word(&mut text, word);
                    }
                }
            }
            self.push_word(&mut text, close);
            let span = Some(Span::new(start, text.len()));
            if std::ptr::eq(mention, e0) {
                s0 = span;
            } else if std::ptr::eq(mention, e1) {
                s1 = span;
            }
            i = mention.word_end.max(i + 1);
        }

        let s0 = s0.ok_or_else(|| TcreError::MissingEntity {
            candidate: cand.id,
            entity_type: typ0.clone(),
        })?;
        // An e1 mention overlapping e0 shares e0's marked span.
        let s1 = s1.unwrap_or(s0);

        Ok(FeatureRecord {
            id: cand.id,
            e0_dist: distances(text.len(), s0),
            e1_dist: distances(text.len(), s1),
            text,
            label: cand.label,
        })
    }

    fn push_word(&self, text: &mut Vec<String>, word: &str) {
        for token in word.split_whitespace() {
            text.push(if self.lower {
                token.to_lowercase()
            } else {
                token.to_string()
            });
        }
    }

    /// Build the feature table for all candidates.
    ///
    /// Fails with [`TcreError::LabelOutOfRange`] if any label lies outside
    /// `[0, 1]`, reporting up to 10 distinct offending values.
    pub fn build(&self, cands: &[Candidate]) -> Result<FeatureTable> {
        info!("Collecting features");
        let mut table = FeatureTable::default();
        for cand in cands {
            if table.contains(cand.id) {
                warn!("Ignoring duplicate candidate object for id {}", cand.id);
                continue;
            }
            table.push(self.record(cand)?);
        }
        table.validate_labels()?;

        info!("Sample feature records:");
        for record in table.iter().take(5) {
            info!("      {}", record);
        }
        info!("Label distribution (label, count, fraction): {:?}", table.label_distribution());
        Ok(table)
    }
}

/// Feature records indexed by candidate id, one row per id.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    rows: Vec<FeatureRecord>,
    index: HashMap<CandidateId, usize>,
}

impl FeatureTable {
    /// Append a row; a row for an already-present id replaces nothing and is dropped.
    pub fn push(&mut self, record: FeatureRecord) {
        if self.index.contains_key(&record.id) {
            return;
        }
        self.index.insert(record.id, self.rows.len());
        self.rows.push(record);
    }

    pub fn get(&self, id: CandidateId) -> Option<&FeatureRecord> {
        self.index.get(&id).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, id: CandidateId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureRecord> {
        self.rows.iter()
    }

    /// Fail if any label lies outside `[0, 1]`.
    pub fn validate_labels(&self) -> Result<()> {
        let mut examples: Vec<f32> = Vec::new();
        for record in self.rows.iter().filter(|r| !r.has_valid_label()) {
            if !examples.iter().any(|e| e.to_bits() == record.label.to_bits()) {
                examples.push(record.label);
            }
        }
        if examples.is_empty() {
            return Ok(());
        }
        examples.truncate(10);
        Err(TcreError::LabelOutOfRange { examples })
    }

    /// `(label, count, fraction)` per distinct label, most frequent first.
    pub fn label_distribution(&self) -> Vec<(f32, usize, f64)> {
        let mut counts: Vec<(f32, usize)> = Vec::new();
        for record in &self.rows {
            match counts.iter_mut().find(|(l, _)| l.to_bits() == record.label.to_bits()) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.label, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.total_cmp(&b.0)));
        let total = self.rows.len().max(1) as f64;
        counts
            .into_iter()
            .map(|(label, n)| (label, n, n as f64 / total))
            .collect()
    }
}

impl FromIterator<FeatureRecord> for FeatureTable {
    fn from_iter<I: IntoIterator<Item = FeatureRecord>>(iter: I) -> Self {
        let mut table = Self::default();
        for record in iter {
            table.push(record);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ENT_TYP_CK, ENT_TYP_CT};

    fn types() -> [String; 2] {
        [ENT_TYP_CK.to_string(), ENT_TYP_CT.to_string()]
    }

    /// "IL-2 induces Th1 cells and IL-4"
    fn candidate(id: CandidateId, label: f32) -> Candidate {
        Candidate {
            id,
            words: ["IL-2", "induces", "Th1 cells", "and", "IL-4"]
                .map(String::from)
                .to_vec(),
            entities: vec![
                EntityMention::new(ENT_TYP_CK, 0, 1, true),
                EntityMention::new(ENT_TYP_CT, 2, 3, true),
                EntityMention::new(ENT_TYP_CK, 4, 5, false),
            ],
            label,
        }
    }

    fn tokens(record: &FeatureRecord) -> Vec<&str> {
        record.text.iter().map(String::as_str).collect()
    }

    #[test]
    fn marks_primary_only_without_swaps() {
        let config = MarkerConfig::build("sngl_01", false, &types(), false).unwrap();
        let types = types();
        let builder = FeatureBuilder::new(&config, &types, false, EntitySelection::for_secondary(false));
        let record = builder.record(&candidate(1, 1.0)).unwrap();

        assert_eq!(
            tokens(&record),
            vec!["<", "IL-2", ">", "induces", "[", "Th1", "cells", "]", "and", "IL-4"]
        );
        assert_eq!(record.e0_dist, vec![0, 0, 0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(record.e1_dist, vec![-4, -3, -2, -1, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn marks_secondary_and_swaps_primary() {
        let config = MarkerConfig::build("mult_01", true, &types(), true).unwrap();
        let types = types();
        let builder = FeatureBuilder::new(&config, &types, false, EntitySelection::for_secondary(true));
        let record = builder.record(&candidate(1, 0.0)).unwrap();

        assert_eq!(
            tokens(&record),
            vec![
                "<", "#", "CYTOKINE", "#", ">", "induces", "<", "@", "CELL", "@", ">", "and", "|", "#",
                "IL-4", "#", "|"
            ]
        );
        assert_eq!(record.e0_dist[..6], [0, 0, 0, 0, 0, 1]);
        assert_eq!(record.e1_dist[5..12], [-1, 0, 0, 0, 0, 0, 1]);
        assert_eq!(record.text.len(), record.e0_dist.len());
    }

    #[test]
    fn lowercases_every_token() {
        let config = MarkerConfig::build("doub_01", false, &types(), true).unwrap();
        let types = types();
        let builder = FeatureBuilder::new(&config, &types, true, EntitySelection::CandidatesOnly);
        let record = builder.record(&candidate(1, 1.0)).unwrap();
        assert!(record.text.iter().all(|t| *t == t.to_lowercase()));
        assert!(record.text.contains(&"cytokine".to_string()));
    }

    #[test]
    fn rejects_out_of_range_labels() {
        let config = MarkerConfig::build("sngl_01", false, &types(), false).unwrap();
        let types = types();
        let builder = FeatureBuilder::new(&config, &types, false, EntitySelection::CandidatesOnly);
        let cands = vec![candidate(1, 1.0), candidate(2, 1.5), candidate(3, 1.5), candidate(4, -2.0)];

        match builder.build(&cands).unwrap_err() {
            TcreError::LabelOutOfRange { examples } => assert_eq!(examples, vec![1.5, -2.0]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reports_at_most_ten_examples() {
        let table: FeatureTable = (0..15)
            .map(|i| FeatureRecord {
                id: i,
                text: vec![],
                label: 2.0 + i as f32,
                e0_dist: vec![],
                e1_dist: vec![],
            })
            .collect();
        match table.validate_labels().unwrap_err() {
            TcreError::LabelOutOfRange { examples } => assert_eq!(examples.len(), 10),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn keeps_one_row_per_id() {
        let config = MarkerConfig::build("sngl_01", false, &types(), false).unwrap();
        let types = types();
        let builder = FeatureBuilder::new(&config, &types, false, EntitySelection::CandidatesOnly);
        let table = builder
            .build(&[candidate(1, 1.0), candidate(1, 0.0), candidate(2, 0.0)])
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().label, 1.0);
        assert_eq!(table.label_distribution()[0].1, 1);
    }

    #[test]
    fn missing_candidate_mention_is_an_error() {
        let config = MarkerConfig::build("sngl_01", false, &types(), false).unwrap();
        let types = types();
        let builder = FeatureBuilder::new(&config, &types, false, EntitySelection::CandidatesOnly);
        let mut cand = candidate(5, 1.0);
        cand.entities.remove(1);
        assert!(matches!(
            builder.record(&cand),
            Err(TcreError::MissingEntity { candidate: 5, .. })
        ));
    }

    #[test]
    fn inverted_or_overlong_span_is_an_error() {
        let config = MarkerConfig::build("sngl_01", false, &types(), false).unwrap();
        let types = types();
        let builder = FeatureBuilder::new(&config, &types, false, EntitySelection::CandidatesOnly);

        let mut inverted = candidate(6, 1.0);
        inverted.entities[0] = EntityMention::new(ENT_TYP_CK, 2, 1, true);
        assert!(matches!(
            builder.build(&[inverted]),
            Err(TcreError::InvalidSpan { candidate: 6, start: 2, end: 1, .. })
        ));

        let mut overlong = candidate(7, 1.0);
        overlong.entities[1] = EntityMention::new(ENT_TYP_CT, 2, 9, true);
        assert!(matches!(
            builder.record(&overlong),
            Err(TcreError::InvalidSpan { candidate: 7, end: 9, words: 5, .. })
        ));
    }
}
