//! Decoded event model
//!
//! Events arrive already decoded from the log-delivery layer as a closed
//! enum, one variant per upstream event type. Dispatch over the enum is an
//! exhaustive `match`, so adding a variant forces every handler site to be
//! revisited at compile time.
//!
//! Delivery is at-least-once and ordered per transaction only; handlers
//! must stay idempotent and tolerant of causally-linked events of one
//! transaction arriving in either order.

use serde::{Deserialize, Serialize};

use crate::db::schemas::NounSeed;

/// The zero address; mint/burn sentinel, never resolved for identity
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Check whether an address is the zero address (case-insensitive)
pub fn is_zero_address(address: &str) -> bool {
    address.eq_ignore_ascii_case(ZERO_ADDRESS)
}

/// Vote support values as emitted on-chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteSupport {
    Against,
    For,
    Abstain,
}

impl VoteSupport {
    /// Proposal tally field incremented by a vote with this support
    pub fn tally_field(&self) -> &'static str {
        match self {
            VoteSupport::Against => "against_votes",
            VoteSupport::For => "for_votes",
            VoteSupport::Abstain => "abstain_votes",
        }
    }
}

/// One decoded log event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
pub enum ChainEvent {
    /// Token transfer; mint when `from` is zero, burn when `to` is zero
    NounTransferred {
        token_id: u64,
        from: String,
        to: String,
    },
    /// Trait seed assignment for a freshly minted token
    SeedAssigned { token_id: u64, seed: NounSeed },

    AuctionCreated {
        noun_id: u64,
        start_time: u64,
        end_time: u64,
    },
    AuctionBidPlaced {
        noun_id: u64,
        bidder: String,
        /// Bid amount in wei, decimal string
        amount: String,
        extended: bool,
    },
    /// Client attribution for the bid placed in the same transaction
    AuctionBidClientAttributed { noun_id: u64, client_id: u32 },
    AuctionExtended { noun_id: u64, end_time: u64 },
    AuctionSettled {
        noun_id: u64,
        winner: String,
        /// Winning amount in wei, decimal string
        amount: String,
    },

    ProposalCreated {
        id: u64,
        proposer: String,
        start_block: u64,
        end_block: u64,
        quorum: u64,
        description: String,
        client_id: Option<u32>,
    },
    /// Content edit during the updatable window; appends a version row
    ProposalUpdated { id: u64, description: String },
    ProposalPendingPeriodStarted { id: u64 },
    ProposalVotingStarted { id: u64 },
    VoteCast {
        proposal_id: u64,
        voter: String,
        support: VoteSupport,
        weight: u64,
        reason: Option<String>,
    },
    /// Client attribution for the vote cast in the same transaction
    VoteClientAttributed {
        proposal_id: u64,
        voter: String,
        client_id: u32,
    },
    ProposalObjectionPeriodStarted { id: u64, objection_end_block: u64 },
    ProposalDefeated { id: u64 },
    ProposalSucceeded { id: u64 },
    ProposalQueued { id: u64, eta: u64 },
    ProposalExecuted { id: u64 },
    ProposalCanceled { id: u64 },
    ProposalVetoed { id: u64 },

    DelegateChanged {
        delegator: String,
        from_delegate: String,
        to_delegate: String,
    },
    DelegateVotesChanged {
        delegate: String,
        previous_weight: u64,
        new_weight: u64,
    },

    ClientRegistered { client_id: u32, name: String },
    ClientApprovalSet { client_id: u32, approved: bool },
    ClientRewarded {
        client_id: u32,
        /// Reward amount in wei, decimal string
        amount: String,
    },
    ClientBalanceWithdrawn {
        client_id: u32,
        amount: String,
        to: String,
    },
    /// Proposal reward distribution covering an inclusive id range
    ProposalRewardsDistributed {
        first_proposal_id: u64,
        last_proposal_id: u64,
    },
    /// Auction reward distribution covering an inclusive id range
    AuctionRewardsDistributed {
        first_auction_id: u64,
        last_auction_id: u64,
    },
}

impl ChainEvent {
    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::NounTransferred { .. } => "noun_transferred",
            ChainEvent::SeedAssigned { .. } => "seed_assigned",
            ChainEvent::AuctionCreated { .. } => "auction_created",
            ChainEvent::AuctionBidPlaced { .. } => "auction_bid_placed",
            ChainEvent::AuctionBidClientAttributed { .. } => "auction_bid_client_attributed",
            ChainEvent::AuctionExtended { .. } => "auction_extended",
            ChainEvent::AuctionSettled { .. } => "auction_settled",
            ChainEvent::ProposalCreated { .. } => "proposal_created",
            ChainEvent::ProposalUpdated { .. } => "proposal_updated",
            ChainEvent::ProposalPendingPeriodStarted { .. } => "proposal_pending_period_started",
            ChainEvent::ProposalVotingStarted { .. } => "proposal_voting_started",
            ChainEvent::VoteCast { .. } => "vote_cast",
            ChainEvent::VoteClientAttributed { .. } => "vote_client_attributed",
            ChainEvent::ProposalObjectionPeriodStarted { .. } => "proposal_objection_period_started",
            ChainEvent::ProposalDefeated { .. } => "proposal_defeated",
            ChainEvent::ProposalSucceeded { .. } => "proposal_succeeded",
            ChainEvent::ProposalQueued { .. } => "proposal_queued",
            ChainEvent::ProposalExecuted { .. } => "proposal_executed",
            ChainEvent::ProposalCanceled { .. } => "proposal_canceled",
            ChainEvent::ProposalVetoed { .. } => "proposal_vetoed",
            ChainEvent::DelegateChanged { .. } => "delegate_changed",
            ChainEvent::DelegateVotesChanged { .. } => "delegate_votes_changed",
            ChainEvent::ClientRegistered { .. } => "client_registered",
            ChainEvent::ClientApprovalSet { .. } => "client_approval_set",
            ChainEvent::ClientRewarded { .. } => "client_rewarded",
            ChainEvent::ClientBalanceWithdrawn { .. } => "client_balance_withdrawn",
            ChainEvent::ProposalRewardsDistributed { .. } => "proposal_rewards_distributed",
            ChainEvent::AuctionRewardsDistributed { .. } => "auction_rewards_distributed",
        }
    }
}

/// A decoded event plus its log coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Source transaction hash
    pub tx_hash: String,
    /// Log index within the transaction
    pub log_index: u64,
    /// Block the log was emitted in
    pub block_number: u64,
    /// Block timestamp in unix seconds
    pub block_timestamp: u64,
    /// Transaction sender
    pub tx_sender: String,
    /// The decoded event
    pub event: ChainEvent,
}
