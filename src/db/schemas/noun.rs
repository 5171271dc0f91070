//! Noun projection schema
//!
//! One row per token, keyed by token id. A row is created by whichever of
//! the mint transfer / seed assignment pair is observed first; the later
//! event merges its fields into the same row. Rows are never deleted -
//! burning sets a flag.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Trait seed assigned at mint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NounSeed {
    pub background: u16,
    pub body: u16,
    pub accessory: u16,
    pub head: u16,
    pub glasses: u16,
}

impl NounSeed {
    /// Placeholder seed used until the assignment event is observed
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Derived trait metrics, computed from the seed by an external calculator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NounMetrics {
    /// Filled artwork area in pixels
    pub area: i64,
    /// Count of distinct colors in the artwork
    pub color_count: i64,
    /// Mean perceived brightness, 0.0..=1.0
    pub brightness: f64,
}

/// Projected noun document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NounDoc {
    /// Token id, natural key
    pub id: i64,

    /// Trait seed; zeroed placeholder until assignment is observed
    #[serde(default)]
    pub seed: NounSeed,

    /// Current owner address
    #[serde(default)]
    pub owner: String,

    /// Rendered artwork markup; empty when no descriptor source applied
    /// or the renderer failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,

    /// Derived trait metrics; zeroed until the seed merge
    #[serde(default)]
    pub metrics: NounMetrics,

    /// Set when the token was transferred to the zero address
    #[serde(default)]
    pub burned: bool,

    /// Mint block; absent while the row is a seed-first placeholder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minted_block: Option<i64>,

    /// Mint block timestamp in unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minted_at: Option<i64>,

    /// Settlement winner, mirrored from the auction on settlement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,

    /// Address that settled the auction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settler: Option<String>,

    /// Winning amount in wei, decimal string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_amount: Option<String>,

    /// Settlement block timestamp in unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<i64>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl NounDoc {
    /// Natural key document for a token id
    pub fn key(token_id: u64) -> Document {
        doc! { "id": token_id as i64 }
    }

    /// Placeholder row inserted by a mint transfer observed before the
    /// seed assignment
    pub fn placeholder(token_id: u64, owner: &str) -> Self {
        Self {
            id: token_id as i64,
            owner: owner.to_string(),
            ..Default::default()
        }
    }
}

impl IntoIndexes for NounDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "owner": 1 }, None),
            (doc! { "burned": 1 }, None),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_has_zero_seed_and_empty_fields() {
        let noun = NounDoc::placeholder(42, "0xabc");
        assert_eq!(noun.id, 42);
        assert_eq!(noun.seed, NounSeed::zero());
        assert_eq!(noun.owner, "0xabc");
        assert!(noun.artwork.is_none());
        assert!(!noun.burned);
    }

    #[test]
    fn test_seed_absent_from_stub_round_trip() {
        let doc = bson::to_document(&NounDoc::placeholder(1, "0xabc")).unwrap();
        let back: NounDoc = bson::from_document(doc).unwrap();
        assert_eq!(back.seed, NounSeed::zero());
        assert_eq!(back.metrics, NounMetrics::default());
    }
}
