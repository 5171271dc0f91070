//! Entity schemas for the materialized collections
//!
//! One serde document struct per collection, each carrying its index
//! definitions and the shared row metadata.

mod auction;
mod client;
mod metadata;
mod noun;
mod proposal;
mod vote;

pub use auction::{AuctionBidDoc, AuctionDoc};
pub use client::{
    parse_wei, reward_cursor, reward_kind, zero_wei, ClientDoc, RewardCursorDoc, RewardUpdateDoc,
};
pub use metadata::Metadata;
pub use noun::{NounDoc, NounMetrics, NounSeed};
pub use proposal::{ProposalDoc, ProposalStatus, ProposalVersionDoc};
pub use vote::{DelegationDoc, VoteDoc, VoterDoc};
