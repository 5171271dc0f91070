//! Vote, voter, and delegation projection schemas
//!
//! Votes are append-only; a vote row is keyed by (transaction, proposal,
//! voter) so the same-transaction client attribution event can address it
//! without knowing the vote's log index. The VoteCast log index is stored
//! as a field. Voters are created lazily on first delegation or vote.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;
use crate::events::VoteSupport;

/// Projected vote document, append-only
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VoteDoc {
    /// Source transaction hash; with proposal_id and voter, the natural key
    pub tx_hash: String,

    pub proposal_id: i64,

    pub voter: String,

    /// Log index of the VoteCast event; absent while the row is an
    /// attribution-first stub
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_index: Option<i64>,

    /// Support value; absent while the row is an attribution-first stub
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support: Option<VoteSupport>,

    /// Voting weight applied to the proposal tally
    #[serde(default)]
    pub weight: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Client attribution, merged in by the same-transaction event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,

    #[serde(default)]
    pub block_number: i64,

    /// Block timestamp in unix seconds
    #[serde(default)]
    pub cast_at: i64,

    #[serde(default)]
    pub metadata: Metadata,
}

impl VoteDoc {
    /// Natural key document for a (transaction, proposal, voter) triple
    pub fn key(tx_hash: &str, proposal_id: u64, voter: &str) -> Document {
        doc! {
            "tx_hash": tx_hash,
            "proposal_id": proposal_id as i64,
            "voter": voter,
        }
    }

    /// Filter matching all votes on one proposal
    pub fn for_proposal(proposal_id: u64) -> Document {
        doc! { "proposal_id": proposal_id as i64 }
    }
}

impl IntoIndexes for VoteDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tx_hash": 1, "proposal_id": 1, "voter": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "proposal_id": 1 }, None),
            (doc! { "voter": 1, "cast_at": -1 }, None),
        ]
    }
}

/// Projected voter aggregate
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VoterDoc {
    /// Voter address, natural key
    pub address: String,

    /// Currently delegated voting weight
    #[serde(default)]
    pub weight: i64,

    /// Lifetime count of votes cast
    #[serde(default)]
    pub vote_count: i64,

    /// First observed activity, unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<i64>,

    /// Most recent observed activity, unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,

    /// Resolved display name, when the identity service knows one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Resolved avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl VoterDoc {
    /// Natural key document for an address
    pub fn key(address: &str) -> Document {
        doc! { "address": address }
    }

    /// Lazily-created row for a first-seen address
    pub fn placeholder(address: &str, seen_at: u64) -> Self {
        Self {
            address: address.to_string(),
            first_seen: Some(seen_at as i64),
            last_seen: Some(seen_at as i64),
            ..Default::default()
        }
    }
}

impl IntoIndexes for VoterDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "address": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "weight": -1 }, None),
        ]
    }
}

/// Append-only delegation change row
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DelegationDoc {
    /// Source transaction hash; with log_index, the natural key
    pub tx_hash: String,
    pub log_index: i64,

    pub delegator: String,
    pub from_delegate: String,
    pub to_delegate: String,

    #[serde(default)]
    pub block_number: i64,

    /// Block timestamp in unix seconds
    #[serde(default)]
    pub changed_at: i64,

    #[serde(default)]
    pub metadata: Metadata,
}

impl DelegationDoc {
    /// Natural key document for a (transaction, log index) pair
    pub fn key(tx_hash: &str, log_index: u64) -> Document {
        doc! { "tx_hash": tx_hash, "log_index": log_index as i64 }
    }
}

impl IntoIndexes for DelegationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tx_hash": 1, "log_index": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "delegator": 1, "changed_at": -1 }, None),
            (doc! { "to_delegate": 1 }, None),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_stub_lacks_support_field() {
        let stub = VoteDoc {
            tx_hash: "0xabc".to_string(),
            proposal_id: 1,
            voter: "0xv".to_string(),
            client_id: Some(3),
            ..Default::default()
        };
        let doc = bson::to_document(&stub).unwrap();
        assert!(!doc.contains_key("support"));
        assert!(!doc.contains_key("log_index"));
    }

    #[test]
    fn test_voter_placeholder_stamps_first_seen() {
        let voter = VoterDoc::placeholder("0xv", 1_700_000_000);
        assert_eq!(voter.first_seen, Some(1_700_000_000));
        assert_eq!(voter.vote_count, 0);
    }
}
