//! Client-incentive handlers: registry, reward ledger, cursors
//!
//! Every distribution event lands in the append-only ledger first, keyed
//! by (transaction, log index); cumulative client totals are only touched
//! when the ledger row was newly inserted, so redelivery never double
//! counts. Range distributions additionally advance the rewarded cursor
//! with `$max`, which tolerates both redelivery and out-of-order ranges.

use bson::doc;

use crate::db::schemas::{parse_wei, reward_kind, ClientDoc, RewardCursorDoc, RewardUpdateDoc};
use crate::db::Entity;
use crate::events::EventEnvelope;
use crate::ingest::{ensure_and_update, Reconciler};
use crate::types::{GazetteError, Result};

impl Reconciler {
    pub(crate) async fn on_client_registered(&self, client_id: u32, name: &str) -> Result<()> {
        let row = bson::to_document(&ClientDoc {
            id: client_id as i64,
            name: name.to_string(),
            ..Default::default()
        })?;
        self.store()
            .insert_or_ignore(Entity::Clients, ClientDoc::key(client_id), row)
            .await?;

        self.store()
            .update(
                Entity::Clients,
                ClientDoc::key(client_id),
                doc! { "$set": { "name": name } },
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn on_client_approval_set(
        &self,
        client_id: u32,
        approved: bool,
    ) -> Result<()> {
        let placeholder = bson::to_document(&ClientDoc::placeholder(client_id))?;
        ensure_and_update(
            self.store(),
            Entity::Clients,
            ClientDoc::key(client_id),
            placeholder,
            doc! { "$set": { "approved": approved } },
        )
        .await
    }

    pub(crate) async fn on_client_rewarded(
        &self,
        env: &EventEnvelope,
        client_id: u32,
        amount: &str,
    ) -> Result<()> {
        self.apply_client_ledger(env, client_id, amount, reward_kind::CLIENT_REWARD, "rewarded")
            .await
    }

    pub(crate) async fn on_client_balance_withdrawn(
        &self,
        env: &EventEnvelope,
        client_id: u32,
        amount: &str,
        _to: &str,
    ) -> Result<()> {
        self.apply_client_ledger(
            env,
            client_id,
            amount,
            reward_kind::CLIENT_WITHDRAWAL,
            "withdrawn",
        )
        .await
    }

    /// Record a per-client ledger row and, when newly inserted, apply the
    /// amount to the client's cumulative total
    async fn apply_client_ledger(
        &self,
        env: &EventEnvelope,
        client_id: u32,
        amount: &str,
        kind: &str,
        total_field: &str,
    ) -> Result<()> {
        let delta = parse_wei(amount).ok_or_else(|| {
            GazetteError::Serialization(format!("invalid wei amount '{amount}'"))
        })?;

        let ledger = bson::to_document(&RewardUpdateDoc {
            tx_hash: env.tx_hash.clone(),
            log_index: env.log_index as i64,
            kind: kind.to_string(),
            client_id: Some(client_id as i64),
            amount: Some(amount.to_string()),
            block_number: env.block_number as i64,
            recorded_at: env.block_timestamp as i64,
            ..Default::default()
        })?;
        let inserted = self
            .store()
            .insert_or_ignore(
                Entity::RewardUpdates,
                RewardUpdateDoc::key(&env.tx_hash, env.log_index),
                ledger,
            )
            .await?;
        if !inserted {
            return Ok(());
        }

        let mut inc = bson::Document::new();
        inc.insert(total_field, delta);

        let placeholder = bson::to_document(&ClientDoc::placeholder(client_id))?;
        ensure_and_update(
            self.store(),
            Entity::Clients,
            ClientDoc::key(client_id),
            placeholder,
            doc! { "$inc": inc },
        )
        .await
    }

    /// Record a range distribution and advance the rewarded cursor
    pub(crate) async fn on_rewards_distributed(
        &self,
        env: &EventEnvelope,
        kind: &str,
        cursor_id: &str,
        first_id: u64,
        last_id: u64,
    ) -> Result<()> {
        let ledger = bson::to_document(&RewardUpdateDoc {
            tx_hash: env.tx_hash.clone(),
            log_index: env.log_index as i64,
            kind: kind.to_string(),
            first_id: Some(first_id as i64),
            last_id: Some(last_id as i64),
            block_number: env.block_number as i64,
            recorded_at: env.block_timestamp as i64,
            ..Default::default()
        })?;
        self.store()
            .insert_or_ignore(
                Entity::RewardUpdates,
                RewardUpdateDoc::key(&env.tx_hash, env.log_index),
                ledger,
            )
            .await?;

        let placeholder = bson::to_document(&RewardCursorDoc {
            id: cursor_id.to_string(),
            ..Default::default()
        })?;
        ensure_and_update(
            self.store(),
            Entity::RewardCursors,
            RewardCursorDoc::key(cursor_id),
            placeholder,
            doc! { "$max": {
                "next_id": (last_id + 1) as i64,
                "last_distribution_at": env.block_timestamp as i64,
            }},
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::reward_cursor;
    use crate::db::Store;
    use crate::events::ChainEvent;
    use crate::ingest::tests::{envelope, test_reconciler};
    use bson::Bson;

    fn rewarded(client_id: u32, amount: &str) -> ChainEvent {
        ChainEvent::ClientRewarded {
            client_id,
            amount: amount.to_string(),
        }
    }

    async fn client_total(store: &crate::db::MemoryStore, client_id: u32, field: &str) -> String {
        let row = store
            .find_one(Entity::Clients, ClientDoc::key(client_id))
            .await
            .unwrap()
            .unwrap();
        match row.get(field).unwrap() {
            Bson::Decimal128(d) => d.to_string(),
            other => panic!("expected decimal total, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rewards_accumulate_across_events() {
        let (reconciler, store) = test_reconciler();
        reconciler
            .apply(&envelope(
                "0xreg",
                0,
                ChainEvent::ClientRegistered { client_id: 3, name: "camp".to_string() },
            ))
            .await
            .unwrap();
        reconciler
            .apply(&envelope("0xr1", 0, rewarded(3, "1000000000000000000")))
            .await
            .unwrap();
        reconciler
            .apply(&envelope("0xr2", 0, rewarded(3, "500000000000000000")))
            .await
            .unwrap();

        assert_eq!(
            client_total(&store, 3, "rewarded").await,
            "1500000000000000000"
        );
    }

    #[tokio::test]
    async fn test_reward_redelivery_counts_once() {
        let (reconciler, store) = test_reconciler();
        let env = envelope("0xr1", 0, rewarded(3, "1000000000000000000"));
        reconciler.apply(&env).await.unwrap();
        reconciler.apply(&env).await.unwrap();

        assert_eq!(
            client_total(&store, 3, "rewarded").await,
            "1000000000000000000"
        );
        assert_eq!(store.count(Entity::RewardUpdates).await, 1);
    }

    #[tokio::test]
    async fn test_reward_before_registration_creates_client_row() {
        let (reconciler, store) = test_reconciler();
        reconciler
            .apply(&envelope("0xr1", 0, rewarded(42, "7")))
            .await
            .unwrap();
        reconciler
            .apply(&envelope(
                "0xreg",
                0,
                ChainEvent::ClientRegistered { client_id: 42, name: "berry".to_string() },
            ))
            .await
            .unwrap();

        let row = store
            .find_one(Entity::Clients, ClientDoc::key(42))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_str("name").unwrap(), "berry");
        assert_eq!(client_total(&store, 42, "rewarded").await, "7");
        assert_eq!(store.count(Entity::Clients).await, 1);
    }

    #[tokio::test]
    async fn test_withdrawal_tracks_separately() {
        let (reconciler, store) = test_reconciler();
        reconciler
            .apply(&envelope("0xr1", 0, rewarded(3, "10")))
            .await
            .unwrap();
        reconciler
            .apply(&envelope(
                "0xw1",
                0,
                ChainEvent::ClientBalanceWithdrawn {
                    client_id: 3,
                    amount: "4".to_string(),
                    to: "0xtreasury".to_string(),
                },
            ))
            .await
            .unwrap();

        assert_eq!(client_total(&store, 3, "rewarded").await, "10");
        assert_eq!(client_total(&store, 3, "withdrawn").await, "4");
    }

    #[tokio::test]
    async fn test_malformed_amount_surfaces_per_event() {
        let (reconciler, _store) = test_reconciler();
        let result = reconciler
            .apply(&envelope("0xbad", 0, rewarded(3, "not-a-number")))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_distribution_advances_cursor_monotonically() {
        let (reconciler, store) = test_reconciler();
        reconciler
            .apply(&envelope(
                "0xd2",
                0,
                ChainEvent::ProposalRewardsDistributed {
                    first_proposal_id: 11,
                    last_proposal_id: 20,
                },
            ))
            .await
            .unwrap();
        // An older range redelivered later must not move the cursor back
        reconciler
            .apply(&envelope(
                "0xd1",
                0,
                ChainEvent::ProposalRewardsDistributed {
                    first_proposal_id: 1,
                    last_proposal_id: 10,
                },
            ))
            .await
            .unwrap();

        let cursor = store
            .find_one(
                Entity::RewardCursors,
                RewardCursorDoc::key(reward_cursor::PROPOSALS),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.get_i64("next_id").unwrap(), 21);
        assert_eq!(store.count(Entity::RewardUpdates).await, 2);
    }
}
