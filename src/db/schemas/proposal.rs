//! Proposal projection schemas
//!
//! One proposal row per proposal id, carrying the lifecycle status machine
//! and monotonically-incremented vote tallies. Content edits append
//! version rows rather than overwriting history.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Proposal lifecycle states
///
/// Transitions are driven one-to-one by specific event types; nothing is
/// inferred from tallies or block numbers. Vote accumulation never changes
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Content edits still permitted (sub-state of pending)
    Updatable,
    /// Created, voting not yet open
    #[default]
    Pending,
    /// Voting open
    Active,
    /// Last-minute objection window; only a defeat can still land
    ObjectionPeriod,
    Succeeded,
    Defeated,
    Queued,
    Executed,
    Cancelled,
    Vetoed,
}

impl ProposalStatus {
    /// Terminal states admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Executed
                | ProposalStatus::Cancelled
                | ProposalStatus::Vetoed
                | ProposalStatus::Defeated
        )
    }

    /// Whether voting has concluded (tallies can no longer grow in favor)
    pub fn voting_concluded(&self) -> bool {
        matches!(
            self,
            ProposalStatus::ObjectionPeriod
                | ProposalStatus::Succeeded
                | ProposalStatus::Defeated
                | ProposalStatus::Queued
                | ProposalStatus::Executed
        )
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<ProposalStatus> {
        match value {
            "updatable" => Some(ProposalStatus::Updatable),
            "pending" => Some(ProposalStatus::Pending),
            "active" => Some(ProposalStatus::Active),
            "objection_period" => Some(ProposalStatus::ObjectionPeriod),
            "succeeded" => Some(ProposalStatus::Succeeded),
            "defeated" => Some(ProposalStatus::Defeated),
            "queued" => Some(ProposalStatus::Queued),
            "executed" => Some(ProposalStatus::Executed),
            "cancelled" => Some(ProposalStatus::Cancelled),
            "vetoed" => Some(ProposalStatus::Vetoed),
            _ => None,
        }
    }

    /// Storage representation, also used in `$set` patches
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Updatable => "updatable",
            ProposalStatus::Pending => "pending",
            ProposalStatus::Active => "active",
            ProposalStatus::ObjectionPeriod => "objection_period",
            ProposalStatus::Succeeded => "succeeded",
            ProposalStatus::Defeated => "defeated",
            ProposalStatus::Queued => "queued",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Cancelled => "cancelled",
            ProposalStatus::Vetoed => "vetoed",
        }
    }
}

/// Projected proposal document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProposalDoc {
    /// Proposal id, natural key
    pub id: i64,

    /// Proposer address; empty on a forward-reference placeholder
    #[serde(default)]
    pub proposer: String,

    #[serde(default)]
    pub status: ProposalStatus,

    /// Monotonically incremented tallies
    #[serde(default)]
    pub for_votes: i64,
    #[serde(default)]
    pub against_votes: i64,
    #[serde(default)]
    pub abstain_votes: i64,

    /// Quorum recorded at creation
    #[serde(default)]
    pub quorum: i64,

    #[serde(default)]
    pub start_block: i64,
    #[serde(default)]
    pub end_block: i64,

    /// Set when an objection period was triggered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objection_end_block: Option<i64>,

    /// Execution eta set on queueing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_eta: Option<i64>,

    /// Creation block; absent on a forward-reference placeholder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_block: Option<i64>,

    /// Creation block timestamp in unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    #[serde(default)]
    pub description: String,

    /// Client attributed to the proposal submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl ProposalDoc {
    /// Natural key document for a proposal id
    pub fn key(id: u64) -> Document {
        doc! { "id": id as i64 }
    }

    /// Placeholder row inserted when a dependent event (vote, status
    /// change) is observed before the creation event
    pub fn placeholder(id: u64) -> Self {
        Self {
            id: id as i64,
            ..Default::default()
        }
    }

    /// Filter matching proposals at or after the rewarded-cursor cutoff
    pub fn rewardable_filter(first_unrewarded_id: u64) -> Document {
        doc! { "id": { "$gte": first_unrewarded_id as i64 } }
    }
}

impl IntoIndexes for ProposalDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "status": 1 }, None),
            (doc! { "proposer": 1 }, None),
        ]
    }
}

/// Append-only audit row for a proposal content edit
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProposalVersionDoc {
    /// Source transaction hash; with log_index, the natural key
    pub tx_hash: String,
    pub log_index: i64,

    /// Edited proposal
    pub proposal_id: i64,

    /// Content after the edit
    #[serde(default)]
    pub description: String,

    /// Block the edit was observed in
    #[serde(default)]
    pub block_number: i64,

    /// Block timestamp in unix seconds
    #[serde(default)]
    pub edited_at: i64,

    #[serde(default)]
    pub metadata: Metadata,
}

impl ProposalVersionDoc {
    /// Natural key document for a (transaction, log index) pair
    pub fn key(tx_hash: &str, log_index: u64) -> Document {
        doc! { "tx_hash": tx_hash, "log_index": log_index as i64 }
    }
}

impl IntoIndexes for ProposalVersionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tx_hash": 1, "log_index": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "proposal_id": 1, "edited_at": 1 }, None),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ProposalStatus::Executed.is_terminal());
        assert!(ProposalStatus::Cancelled.is_terminal());
        assert!(ProposalStatus::Vetoed.is_terminal());
        assert!(ProposalStatus::Defeated.is_terminal());
        assert!(!ProposalStatus::Succeeded.is_terminal());
        assert!(!ProposalStatus::Active.is_terminal());
        assert!(!ProposalStatus::Updatable.is_terminal());
    }

    #[test]
    fn test_voting_concluded_covers_objection_period() {
        assert!(ProposalStatus::ObjectionPeriod.voting_concluded());
        assert!(ProposalStatus::Queued.voting_concluded());
        assert!(!ProposalStatus::Active.voting_concluded());
        assert!(!ProposalStatus::Pending.voting_concluded());
    }

    #[test]
    fn test_status_parse_round_trips() {
        for status in [
            ProposalStatus::Updatable,
            ProposalStatus::Pending,
            ProposalStatus::Active,
            ProposalStatus::ObjectionPeriod,
            ProposalStatus::Succeeded,
            ProposalStatus::Defeated,
            ProposalStatus::Queued,
            ProposalStatus::Executed,
            ProposalStatus::Cancelled,
            ProposalStatus::Vetoed,
        ] {
            assert_eq!(ProposalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProposalStatus::parse("bogus"), None);
    }

    #[test]
    fn test_status_serializes_as_snake_case() {
        let doc = bson::to_document(&ProposalDoc {
            status: ProposalStatus::ObjectionPeriod,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(doc.get_str("status").unwrap(), "objection_period");
    }

    #[test]
    fn test_rewardable_filter_is_inclusive() {
        let filter = ProposalDoc::rewardable_filter(100);
        let bound = filter.get_document("id").unwrap();
        assert_eq!(bound.get_i64("$gte").unwrap(), 100);
    }
}
