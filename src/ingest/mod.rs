//! Event-to-Entity Reconciler
//!
//! Maps one decoded event to one or more idempotent upserts against the
//! derived store. Processing the same event twice produces the same final
//! state, and causally-linked events of one transaction converge to the
//! same state in either arrival order: whichever side of a dependent pair
//! arrives first creates the row (insert-if-absent), the later side merges
//! its fields in (insert-or-merge).
//!
//! Failure semantics per event: renderer/metrics/identity failures degrade
//! to empty derived fields and the row is still committed; a best-effort
//! secondary update against a row that does not exist yet is a logged
//! no-op; a primary write failure surfaces as an error for that event only.

mod auctions;
mod clients;
mod governance;
mod nouns;
pub mod pipeline;

use std::sync::Arc;

use bson::{doc, Document};
use tracing::debug;

use crate::artwork::{ArtworkRenderer, DescriptorRegistry, TraitMetrics};
use crate::db::schemas::{reward_cursor, reward_kind, ProposalStatus};
use crate::db::{Entity, Store};
use crate::events::{ChainEvent, EventEnvelope};
use crate::identity::IdentityResolver;
use crate::types::Result;

pub use pipeline::{Pipeline, PipelineConfig};

/// Event-to-entity reconciler
pub struct Reconciler {
    store: Arc<dyn Store>,
    identity: Arc<IdentityResolver>,
    descriptors: DescriptorRegistry,
    renderer: Option<Arc<dyn ArtworkRenderer>>,
    metrics: Option<Arc<dyn TraitMetrics>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        identity: Arc<IdentityResolver>,
        descriptors: DescriptorRegistry,
    ) -> Self {
        Self {
            store,
            identity,
            descriptors,
            renderer: None,
            metrics: None,
        }
    }

    /// Attach the external artwork renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn ArtworkRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Attach the external trait-metrics calculator
    pub fn with_metrics(mut self, metrics: Arc<dyn TraitMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub(crate) fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub(crate) fn descriptors(&self) -> &DescriptorRegistry {
        &self.descriptors
    }

    pub(crate) fn renderer(&self) -> Option<&Arc<dyn ArtworkRenderer>> {
        self.renderer.as_ref()
    }

    pub(crate) fn trait_metrics(&self) -> Option<&Arc<dyn TraitMetrics>> {
        self.metrics.as_ref()
    }

    /// Apply one event to the derived store
    pub async fn apply(&self, env: &EventEnvelope) -> Result<()> {
        debug!(
            event = env.event.name(),
            tx = %env.tx_hash,
            log_index = env.log_index,
            block = env.block_number,
            "applying event"
        );

        match &env.event {
            ChainEvent::NounTransferred { token_id, from, to } => {
                self.on_noun_transferred(env, *token_id, from, to).await
            }
            ChainEvent::SeedAssigned { token_id, seed } => {
                self.on_seed_assigned(env, *token_id, seed).await
            }

            ChainEvent::AuctionCreated { noun_id, start_time, end_time } => {
                self.on_auction_created(*noun_id, *start_time, *end_time).await
            }
            ChainEvent::AuctionBidPlaced { noun_id, bidder, amount, extended } => {
                self.on_auction_bid_placed(env, *noun_id, bidder, amount, *extended)
                    .await
            }
            ChainEvent::AuctionBidClientAttributed { noun_id, client_id } => {
                self.on_auction_bid_client_attributed(env, *noun_id, *client_id)
                    .await
            }
            ChainEvent::AuctionExtended { noun_id, end_time } => {
                self.on_auction_extended(*noun_id, *end_time).await
            }
            ChainEvent::AuctionSettled { noun_id, winner, amount } => {
                self.on_auction_settled(env, *noun_id, winner, amount).await
            }

            ChainEvent::ProposalCreated {
                id,
                proposer,
                start_block,
                end_block,
                quorum,
                description,
                client_id,
            } => {
                self.on_proposal_created(
                    env,
                    *id,
                    proposer,
                    *start_block,
                    *end_block,
                    *quorum,
                    description,
                    *client_id,
                )
                .await
            }
            ChainEvent::ProposalUpdated { id, description } => {
                self.on_proposal_updated(env, *id, description).await
            }
            ChainEvent::ProposalPendingPeriodStarted { id } => {
                self.on_proposal_status(*id, ProposalStatus::Pending, None)
                    .await
            }
            ChainEvent::ProposalVotingStarted { id } => {
                self.on_proposal_status(*id, ProposalStatus::Active, None)
                    .await
            }
            ChainEvent::VoteCast { proposal_id, voter, support, weight, reason } => {
                self.on_vote_cast(env, *proposal_id, voter, *support, *weight, reason.as_deref())
                    .await
            }
            ChainEvent::VoteClientAttributed { proposal_id, voter, client_id } => {
                self.on_vote_client_attributed(env, *proposal_id, voter, *client_id)
                    .await
            }
            ChainEvent::ProposalObjectionPeriodStarted { id, objection_end_block } => {
                self.on_proposal_status(
                    *id,
                    ProposalStatus::ObjectionPeriod,
                    Some(doc! { "objection_end_block": *objection_end_block as i64 }),
                )
                .await
            }
            ChainEvent::ProposalDefeated { id } => {
                self.on_proposal_status(*id, ProposalStatus::Defeated, None)
                    .await
            }
            ChainEvent::ProposalSucceeded { id } => {
                self.on_proposal_status(*id, ProposalStatus::Succeeded, None)
                    .await
            }
            ChainEvent::ProposalQueued { id, eta } => {
                self.on_proposal_status(
                    *id,
                    ProposalStatus::Queued,
                    Some(doc! { "queue_eta": *eta as i64 }),
                )
                .await
            }
            ChainEvent::ProposalExecuted { id } => {
                self.on_proposal_status(*id, ProposalStatus::Executed, None)
                    .await
            }
            ChainEvent::ProposalCanceled { id } => {
                self.on_proposal_status(*id, ProposalStatus::Cancelled, None)
                    .await
            }
            ChainEvent::ProposalVetoed { id } => {
                self.on_proposal_status(*id, ProposalStatus::Vetoed, None)
                    .await
            }

            ChainEvent::DelegateChanged { delegator, from_delegate, to_delegate } => {
                self.on_delegate_changed(env, delegator, from_delegate, to_delegate)
                    .await
            }
            ChainEvent::DelegateVotesChanged { delegate, previous_weight, new_weight } => {
                self.on_delegate_votes_changed(env, delegate, *previous_weight, *new_weight)
                    .await
            }

            ChainEvent::ClientRegistered { client_id, name } => {
                self.on_client_registered(*client_id, name).await
            }
            ChainEvent::ClientApprovalSet { client_id, approved } => {
                self.on_client_approval_set(*client_id, *approved).await
            }
            ChainEvent::ClientRewarded { client_id, amount } => {
                self.on_client_rewarded(env, *client_id, amount).await
            }
            ChainEvent::ClientBalanceWithdrawn { client_id, amount, to } => {
                self.on_client_balance_withdrawn(env, *client_id, amount, to).await
            }
            ChainEvent::ProposalRewardsDistributed { first_proposal_id, last_proposal_id } => {
                self.on_rewards_distributed(
                    env,
                    reward_kind::PROPOSAL_DISTRIBUTION,
                    reward_cursor::PROPOSALS,
                    *first_proposal_id,
                    *last_proposal_id,
                )
                .await
            }
            ChainEvent::AuctionRewardsDistributed { first_auction_id, last_auction_id } => {
                self.on_rewards_distributed(
                    env,
                    reward_kind::AUCTION_DISTRIBUTION,
                    reward_cursor::AUCTIONS,
                    *first_auction_id,
                    *last_auction_id,
                )
                .await
            }
        }
    }
}

/// Apply a modification to a row that may not exist yet: try the update,
/// insert the placeholder on a miss, and apply the update again.
///
/// Both steps are keyed upserts, so concurrent writers racing on the
/// placeholder converge: at most one insert wins and every update lands.
pub(crate) async fn ensure_and_update(
    store: &dyn Store,
    entity: Entity,
    key: Document,
    placeholder: Document,
    change: Document,
) -> Result<()> {
    if store
        .update(entity, key.clone(), change.clone())
        .await?
    {
        return Ok(());
    }

    store
        .insert_or_ignore(entity, key.clone(), placeholder)
        .await?;
    store.update(entity, key, change).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use bson::Document;
    use std::sync::Arc;

    use crate::artwork::{ArtworkRenderer, TraitMetrics};
    use crate::db::schemas::{NounMetrics, NounSeed};
    use crate::db::MemoryStore;
    use crate::types::GazetteError;

    /// Deterministic stand-in for the external trait-metrics calculator
    pub struct FakeMetrics;

    impl TraitMetrics for FakeMetrics {
        fn compute(&self, seed: &NounSeed) -> NounMetrics {
            let sum = seed.background as i64
                + seed.body as i64
                + seed.accessory as i64
                + seed.head as i64
                + seed.glasses as i64;
            NounMetrics {
                area: 100 + sum,
                color_count: 1 + (sum % 7),
                brightness: 0.5,
            }
        }
    }

    /// Renderer stand-in that emits markup naming its source
    pub struct FakeRenderer;

    #[async_trait]
    impl ArtworkRenderer for FakeRenderer {
        async fn render(&self, source_id: &str, _seed: &NounSeed) -> Result<String> {
            Ok(format!("<svg data-source=\"{source_id}\"/>"))
        }
    }

    /// Renderer stand-in that always fails, for degrade paths
    pub struct FailingRenderer;

    #[async_trait]
    impl ArtworkRenderer for FailingRenderer {
        async fn render(&self, source_id: &str, _seed: &NounSeed) -> Result<String> {
            Err(GazetteError::Renderer(format!("{source_id} unavailable")))
        }
    }

    /// Reconciler over a fresh in-memory store with fake collaborators
    pub fn test_reconciler() -> (Reconciler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let descriptors = DescriptorRegistry::from_pairs(vec![("descriptor-v1".to_string(), 0)]);
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(IdentityResolver::new()),
            descriptors,
        )
        .with_metrics(Arc::new(FakeMetrics))
        .with_renderer(Arc::new(FakeRenderer));
        (reconciler, store)
    }

    /// Envelope with fixed block coordinates for handler tests
    pub fn envelope(tx_hash: &str, log_index: u64, event: ChainEvent) -> EventEnvelope {
        EventEnvelope {
            tx_hash: tx_hash.to_string(),
            log_index,
            block_number: 1_000,
            block_timestamp: 1_700_000_000,
            tx_sender: "0xsender".to_string(),
            event,
        }
    }

    /// Row copy without the write-time metadata stamps
    pub fn strip_metadata(row: &Document) -> Document {
        let mut row = row.clone();
        row.remove("metadata");
        row
    }

    #[tokio::test]
    async fn test_ensure_and_update_creates_then_applies() {
        let store = MemoryStore::new();
        let key = bson::doc! { "id": 1_i64 };
        ensure_and_update(
            &store,
            Entity::Proposals,
            key.clone(),
            bson::doc! { "for_votes": 0_i64 },
            bson::doc! { "$inc": { "for_votes": 5_i64 } },
        )
        .await
        .unwrap();

        let row = store
            .find_one(Entity::Proposals, key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_i64("for_votes").unwrap(), 5);
    }
}
