//! Auction projection schemas
//!
//! One auction row per noun id, mutated by bid, extension, and settlement
//! events until the terminal settled state. Bids are append-only, one row
//! per (transaction, noun id) - the client attribution event of the same
//! transaction merges into the existing bid row.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Projected auction document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuctionDoc {
    /// Noun id being auctioned, natural key
    pub noun_id: i64,

    /// Auction start time in unix seconds
    #[serde(default)]
    pub start_time: i64,

    /// Auction end time in unix seconds; moves forward on extension
    #[serde(default)]
    pub end_time: i64,

    /// Terminal state flag
    #[serde(default)]
    pub settled: bool,

    /// Highest bidder so far; confirmed winner once settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,

    /// Highest bid so far in wei, decimal string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    /// Address that settled the auction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settler: Option<String>,

    /// Settlement block timestamp in unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<i64>,

    /// Client attributed to the winning bid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl AuctionDoc {
    /// Natural key document for a noun id
    pub fn key(noun_id: u64) -> Document {
        doc! { "noun_id": noun_id as i64 }
    }
}

impl IntoIndexes for AuctionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "noun_id": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "settled": 1, "end_time": -1 }, None),
        ]
    }
}

/// Projected auction bid document, append-only
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuctionBidDoc {
    /// Source transaction hash; with noun_id, the natural key
    pub tx_hash: String,

    /// Noun id the bid targets
    pub noun_id: i64,

    /// Bidder address
    #[serde(default)]
    pub bidder: String,

    /// Bid amount in wei, decimal string
    #[serde(default)]
    pub amount: String,

    /// Whether this bid extended the auction
    #[serde(default)]
    pub extended: bool,

    /// Client attribution, merged in by the same-transaction event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,

    /// Block the bid was observed in
    #[serde(default)]
    pub block_number: i64,

    /// Block timestamp in unix seconds
    #[serde(default)]
    pub placed_at: i64,

    #[serde(default)]
    pub metadata: Metadata,
}

impl AuctionBidDoc {
    /// Natural key document for a (transaction, noun id) pair
    pub fn key(tx_hash: &str, noun_id: u64) -> Document {
        doc! { "tx_hash": tx_hash, "noun_id": noun_id as i64 }
    }
}

impl IntoIndexes for AuctionBidDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tx_hash": 1, "noun_id": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "noun_id": 1, "placed_at": -1 }, None),
            (doc! { "bidder": 1 }, None),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bid_key_pairs_transaction_and_noun() {
        let key = AuctionBidDoc::key("0xdead", 7);
        assert_eq!(key.get_str("tx_hash").unwrap(), "0xdead");
        assert_eq!(key.get_i64("noun_id").unwrap(), 7);
    }
}
