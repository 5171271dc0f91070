//! Store boundary
//!
//! All derived state flows through this trait. Writes are expressed as
//! natural-key upserts so concurrent or repeated writers converge without
//! explicit locking:
//!
//! - `insert_or_ignore` - insert a row keyed by its natural key, ignoring
//!   the insert if the row already exists. Returns whether the row was
//!   newly inserted, which is what makes at-most-once side effects (tally
//!   increments) possible under redelivery.
//! - `insert_or_merge` - upsert that combines the given fields into an
//!   existing row rather than replacing it wholesale; creates the row from
//!   the key plus the merge fields when absent. This is the primitive that
//!   makes forward references (dependent event observed first) converge.
//! - `update` - apply a modification document (`$set`/`$inc`/`$max`/`$min`)
//!   to an existing row; returns false instead of failing when no row
//!   matches, so best-effort secondary updates degrade to no-ops.

use async_trait::async_trait;
use bson::Document;

use crate::types::Result;

/// Materialized entity collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Nouns,
    Auctions,
    AuctionBids,
    Proposals,
    ProposalVersions,
    Votes,
    Voters,
    Delegations,
    Clients,
    RewardUpdates,
    RewardCursors,
}

impl Entity {
    /// Collection name in the store
    pub fn collection(&self) -> &'static str {
        match self {
            Entity::Nouns => "nouns",
            Entity::Auctions => "auctions",
            Entity::AuctionBids => "auction_bids",
            Entity::Proposals => "proposals",
            Entity::ProposalVersions => "proposal_versions",
            Entity::Votes => "votes",
            Entity::Voters => "voters",
            Entity::Delegations => "delegations",
            Entity::Clients => "clients",
            Entity::RewardUpdates => "reward_updates",
            Entity::RewardCursors => "reward_cursors",
        }
    }

    /// All entities, for index setup
    pub fn all() -> &'static [Entity] {
        &[
            Entity::Nouns,
            Entity::Auctions,
            Entity::AuctionBids,
            Entity::Proposals,
            Entity::ProposalVersions,
            Entity::Votes,
            Entity::Voters,
            Entity::Delegations,
            Entity::Clients,
            Entity::RewardUpdates,
            Entity::RewardCursors,
        ]
    }
}

/// Natural-key upsert store for materialized entities
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert `doc` keyed by `key` unless a row with that key exists.
    /// Returns true when the row was newly inserted.
    async fn insert_or_ignore(&self, entity: Entity, key: Document, doc: Document)
        -> Result<bool>;

    /// Merge `fields` into the row keyed by `key`, creating it from the
    /// key and fields when absent.
    async fn insert_or_merge(&self, entity: Entity, key: Document, fields: Document)
        -> Result<()>;

    /// Apply a modification document to the row keyed by `key`. Returns
    /// false when no row matched.
    async fn update(&self, entity: Entity, key: Document, change: Document) -> Result<bool>;

    /// Find one row by key
    async fn find_one(&self, entity: Entity, key: Document) -> Result<Option<Document>>;

    /// Find all rows matching a filter (equality and `$gte` bounds)
    async fn find_many(&self, entity: Entity, filter: Document) -> Result<Vec<Document>>;
}
