//! # Marker/Swap Config Builder
//!
//! Resolves a named marker list and an entity type pair into the concrete
//! marker pairs and text swaps applied by the feature builder.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TcreError};
use crate::types::{ENT_TYP_CK, ENT_TYP_CT, ENT_TYP_TF};

/// `[open, close]` marker strings. A marker may hold several
/// whitespace-separated tokens (e.g. `"< #"`).
pub type MarkerPair = [String; 2];

/// Named marker lists: primary e0, primary e1, secondary e0, secondary e1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerListName {
    #[serde(rename = "doub_01")]
    Doub01,
    #[serde(rename = "sngl_01")]
    Sngl01,
    #[serde(rename = "mult_01")]
    Mult01,
}

impl MarkerListName {
    fn pairs(self) -> [(&'static str, &'static str); 4] {
        match self {
            Self::Doub01 => [("<<", ">>"), ("[[", "]]"), ("##", "##"), ("@@", "@@")],
            Self::Sngl01 => [("<", ">"), ("[", "]"), ("#", "#"), ("@", "@")],
            Self::Mult01 => [("< #", "# >"), ("< @", "@ >"), ("| #", "# |"), ("| @", "@")],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doub01 => "doub_01",
            Self::Sngl01 => "sngl_01",
            Self::Mult01 => "mult_01",
        }
    }
}

impl FromStr for MarkerListName {
    type Err = TcreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "doub_01" => Ok(Self::Doub01),
            "sngl_01" => Ok(Self::Sngl01),
            "mult_01" => Ok(Self::Mult01),
            other => Err(TcreError::UnknownMarkerList(other.to_string())),
        }
    }
}

impl std::fmt::Display for MarkerListName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker pairs per entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markers {
    /// Markers around the two candidate mentions.
    pub primary: BTreeMap<String, MarkerPair>,
    /// Markers around other mentions of the same types; empty when disabled.
    pub secondary: BTreeMap<String, MarkerPair>,
}

/// Canonical replacement token per entity type.
pub type Swaps = BTreeMap<String, String>;

/// Replacement tokens for candidate mention text.
pub fn default_swaps() -> Swaps {
    [(ENT_TYP_CT, "CELL"), (ENT_TYP_CK, "CYTOKINE"), (ENT_TYP_TF, "TF")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Resolved marking and substitution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerConfig {
    pub markers: Markers,
    /// `None` when swaps are disabled.
    pub swaps: Option<Swaps>,
}

impl MarkerConfig {
    /// Build the configuration for a marker list name and entity type pair.
    pub fn build(
        marker_list: &str,
        use_secondary: bool,
        entity_types: &[String; 2],
        use_swaps: bool,
    ) -> Result<Self> {
        let [p0, p1, s0, s1] = marker_list.parse::<MarkerListName>()?.pairs();
        let [typ0, typ1] = entity_types;
        let pair = |(open, close): (&str, &str)| -> MarkerPair { [open.to_string(), close.to_string()] };

        let primary = BTreeMap::from([(typ0.clone(), pair(p0)), (typ1.clone(), pair(p1))]);
        let secondary = if use_secondary {
            BTreeMap::from([(typ0.clone(), pair(s0)), (typ1.clone(), pair(s1))])
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            markers: Markers { primary, secondary },
            swaps: use_swaps.then(default_swaps),
        })
    }
}
