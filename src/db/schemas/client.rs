//! Client-incentive projection schemas
//!
//! Registered incentive clients carry cumulative reward/withdrawal totals;
//! every distribution event also lands in an append-only ledger carrying
//! the proposal-id or auction-id range it covers. A single cursor row per
//! reward kind records the first not-yet-rewarded id and the last
//! distribution timestamp, which the eligibility engine reads as its
//! cutoff.

use bson::{doc, Decimal128, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Zero wei as a store decimal
pub fn zero_wei() -> Decimal128 {
    Decimal128::from_str("0").expect("zero is a valid decimal")
}

/// Parse a decimal wei string into a store decimal
pub fn parse_wei(amount: &str) -> Option<Decimal128> {
    amount.parse::<u128>().ok()?;
    Decimal128::from_str(amount).ok()
}

/// Registered incentive client
///
/// Cumulative totals are Decimal128 so distribution events can be applied
/// as atomic `$inc` updates even when two transactions reward the same
/// client concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDoc {
    /// Client id, natural key
    pub id: i64,

    #[serde(default)]
    pub name: String,

    /// Whether the client is approved for withdrawals
    #[serde(default)]
    pub approved: bool,

    /// Cumulative rewarded amount in wei
    #[serde(default = "zero_wei")]
    pub rewarded: Decimal128,

    /// Cumulative withdrawn amount in wei
    #[serde(default = "zero_wei")]
    pub withdrawn: Decimal128,

    #[serde(default)]
    pub metadata: Metadata,
}

impl Default for ClientDoc {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            approved: false,
            rewarded: zero_wei(),
            withdrawn: zero_wei(),
            metadata: Metadata::default(),
        }
    }
}

impl ClientDoc {
    /// Natural key document for a client id
    pub fn key(client_id: u32) -> Document {
        doc! { "id": client_id as i64 }
    }

    /// Lazily-created row for a client first seen via a reward event
    pub fn placeholder(client_id: u32) -> Self {
        Self {
            id: client_id as i64,
            ..Default::default()
        }
    }
}

impl IntoIndexes for ClientDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "id": 1 },
            Some(IndexOptions::builder().unique(true).build()),
        )]
    }
}

/// Ledger row kinds
pub mod reward_kind {
    pub const CLIENT_REWARD: &str = "client_reward";
    pub const CLIENT_WITHDRAWAL: &str = "client_withdrawal";
    pub const PROPOSAL_DISTRIBUTION: &str = "proposal_distribution";
    pub const AUCTION_DISTRIBUTION: &str = "auction_distribution";
}

/// Append-only reward ledger row
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RewardUpdateDoc {
    /// Source transaction hash; with log_index, the natural key
    pub tx_hash: String,
    pub log_index: i64,

    /// One of the `reward_kind` constants
    pub kind: String,

    /// Affected client, for per-client ledger kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,

    /// Amount in wei, decimal string, for per-client ledger kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    /// First id of the covered range, for distribution kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_id: Option<i64>,

    /// Last id of the covered range, for distribution kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_id: Option<i64>,

    #[serde(default)]
    pub block_number: i64,

    /// Block timestamp in unix seconds
    #[serde(default)]
    pub recorded_at: i64,

    #[serde(default)]
    pub metadata: Metadata,
}

impl RewardUpdateDoc {
    /// Natural key document for a (transaction, log index) pair
    pub fn key(tx_hash: &str, log_index: u64) -> Document {
        doc! { "tx_hash": tx_hash, "log_index": log_index as i64 }
    }
}

impl IntoIndexes for RewardUpdateDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tx_hash": 1, "log_index": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "kind": 1, "recorded_at": -1 }, None),
            (doc! { "client_id": 1 }, None),
        ]
    }
}

/// Cursor ids for the two distribution streams
pub mod reward_cursor {
    pub const PROPOSALS: &str = "proposal_rewards";
    pub const AUCTIONS: &str = "auction_rewards";
}

/// Rewarded-range cursor, one row per reward kind
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RewardCursorDoc {
    /// Cursor id, one of the `reward_cursor` constants
    pub id: String,

    /// First id not yet covered by any distribution
    #[serde(default)]
    pub next_id: i64,

    /// Timestamp of the most recent distribution, unix seconds
    #[serde(default)]
    pub last_distribution_at: i64,

    #[serde(default)]
    pub metadata: Metadata,
}

impl RewardCursorDoc {
    /// Natural key document for a cursor id
    pub fn key(id: &str) -> Document {
        doc! { "id": id }
    }
}

impl IntoIndexes for RewardCursorDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "id": 1 },
            Some(IndexOptions::builder().unique(true).build()),
        )]
    }
}
