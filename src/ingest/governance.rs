//! Governance handlers: proposals, votes, voters, delegation
//!
//! Proposal status transitions are driven one-to-one by event type; an
//! event that would move a proposal out of a terminal state is ignored,
//! which also makes redelivery of terminal events a no-op. Vote tallies
//! are incremented in place, at most once per vote, gated on the vote row
//! being newly recorded.

use bson::{doc, Document};
use tracing::debug;

use crate::db::schemas::{
    DelegationDoc, ProposalDoc, ProposalStatus, ProposalVersionDoc, VoteDoc, VoterDoc,
};
use crate::db::Entity;
use crate::events::{EventEnvelope, VoteSupport};
use crate::identity::Identity;
use crate::ingest::{ensure_and_update, Reconciler};
use crate::types::Result;

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn on_proposal_created(
        &self,
        env: &EventEnvelope,
        id: u64,
        proposer: &str,
        start_block: u64,
        end_block: u64,
        quorum: u64,
        description: &str,
        client_id: Option<u32>,
    ) -> Result<()> {
        let key = ProposalDoc::key(id);
        let row = bson::to_document(&ProposalDoc {
            id: id as i64,
            proposer: proposer.to_string(),
            status: ProposalStatus::Updatable,
            quorum: quorum as i64,
            start_block: start_block as i64,
            end_block: end_block as i64,
            created_block: Some(env.block_number as i64),
            created_at: Some(env.block_timestamp as i64),
            description: description.to_string(),
            client_id: client_id.map(|c| c as i64),
            ..Default::default()
        })?;
        self.store()
            .insert_or_ignore(Entity::Proposals, key.clone(), row)
            .await?;

        // Content fields are safe to re-set on redelivery; status is not,
        // a later lifecycle event may already have advanced it
        let mut set = doc! {
            "proposer": proposer,
            "quorum": quorum as i64,
            "start_block": start_block as i64,
            "end_block": end_block as i64,
            "created_block": env.block_number as i64,
            "created_at": env.block_timestamp as i64,
            "description": description,
        };
        if let Some(client_id) = client_id {
            set.insert("client_id", client_id as i64);
        }
        self.store()
            .update(Entity::Proposals, key, doc! { "$set": set })
            .await?;
        Ok(())
    }

    pub(crate) async fn on_proposal_updated(
        &self,
        env: &EventEnvelope,
        id: u64,
        description: &str,
    ) -> Result<()> {
        let version = bson::to_document(&ProposalVersionDoc {
            tx_hash: env.tx_hash.clone(),
            log_index: env.log_index as i64,
            proposal_id: id as i64,
            description: description.to_string(),
            block_number: env.block_number as i64,
            edited_at: env.block_timestamp as i64,
            ..Default::default()
        })?;
        self.store()
            .insert_or_ignore(
                Entity::ProposalVersions,
                ProposalVersionDoc::key(&env.tx_hash, env.log_index),
                version,
            )
            .await?;

        self.store()
            .insert_or_merge(
                Entity::Proposals,
                ProposalDoc::key(id),
                doc! { "description": description },
            )
            .await
    }

    /// Apply an event-named status transition
    pub(crate) async fn on_proposal_status(
        &self,
        id: u64,
        status: ProposalStatus,
        extra: Option<Document>,
    ) -> Result<()> {
        let key = ProposalDoc::key(id);

        if let Some(row) = self.store().find_one(Entity::Proposals, key.clone()).await? {
            let current = row
                .get_str("status")
                .ok()
                .and_then(ProposalStatus::parse)
                .unwrap_or_default();
            if current.is_terminal() && current != status {
                debug!(
                    proposal_id = id,
                    current = current.as_str(),
                    requested = status.as_str(),
                    "ignoring transition out of a terminal state"
                );
                return Ok(());
            }
        }

        let mut set = extra.unwrap_or_default();
        set.insert("status", status.as_str());

        let placeholder = bson::to_document(&ProposalDoc::placeholder(id))?;
        ensure_and_update(
            self.store(),
            Entity::Proposals,
            key,
            placeholder,
            doc! { "$set": set },
        )
        .await
    }

    pub(crate) async fn on_vote_cast(
        &self,
        env: &EventEnvelope,
        proposal_id: u64,
        voter: &str,
        support: VoteSupport,
        weight: u64,
        reason: Option<&str>,
    ) -> Result<()> {
        let voter = voter.to_lowercase();
        let key = VoteDoc::key(&env.tx_hash, proposal_id, &voter);

        let row = bson::to_document(&VoteDoc {
            tx_hash: env.tx_hash.clone(),
            proposal_id: proposal_id as i64,
            voter: voter.clone(),
            log_index: Some(env.log_index as i64),
            support: Some(support),
            weight: weight as i64,
            reason: reason.map(|r| r.to_string()),
            block_number: env.block_number as i64,
            cast_at: env.block_timestamp as i64,
            ..Default::default()
        })?;

        let inserted = self
            .store()
            .insert_or_ignore(Entity::Votes, key.clone(), row)
            .await?;

        let mut newly_recorded = inserted;
        if !inserted {
            // The row may be a stub created by the same-transaction client
            // attribution event arriving first; a redelivered VoteCast
            // finds the payload already present and changes nothing
            if let Some(existing) = self.store().find_one(Entity::Votes, key.clone()).await? {
                if !existing.contains_key("support") {
                    let mut set = doc! {
                        "log_index": env.log_index as i64,
                        "support": bson::to_bson(&support)?,
                        "weight": weight as i64,
                        "block_number": env.block_number as i64,
                        "cast_at": env.block_timestamp as i64,
                    };
                    if let Some(reason) = reason {
                        set.insert("reason", reason);
                    }
                    self.store()
                        .update(Entity::Votes, key, doc! { "$set": set })
                        .await?;
                    newly_recorded = true;
                }
            }
        }

        if !newly_recorded {
            return Ok(());
        }

        // Tally accumulation: increment in place, exactly once per vote
        let mut inc = Document::new();
        inc.insert(support.tally_field(), weight as i64);

        let placeholder = bson::to_document(&ProposalDoc::placeholder(proposal_id))?;
        ensure_and_update(
            self.store(),
            Entity::Proposals,
            ProposalDoc::key(proposal_id),
            placeholder,
            doc! { "$inc": inc },
        )
        .await?;

        self.touch_voter(
            &voter,
            env.block_timestamp,
            doc! { "$inc": { "vote_count": 1_i64 } },
        )
        .await?;

        // Display identity, fail-soft
        let identity = self.identity().resolve(&voter).await;
        self.persist_identity(&voter, &identity).await?;

        Ok(())
    }

    pub(crate) async fn on_vote_client_attributed(
        &self,
        env: &EventEnvelope,
        proposal_id: u64,
        voter: &str,
        client_id: u32,
    ) -> Result<()> {
        let voter = voter.to_lowercase();
        self.store()
            .insert_or_merge(
                Entity::Votes,
                VoteDoc::key(&env.tx_hash, proposal_id, &voter),
                doc! { "client_id": client_id as i64 },
            )
            .await
    }

    pub(crate) async fn on_delegate_changed(
        &self,
        env: &EventEnvelope,
        delegator: &str,
        from_delegate: &str,
        to_delegate: &str,
    ) -> Result<()> {
        let delegator = delegator.to_lowercase();
        let to_delegate = to_delegate.to_lowercase();

        let row = bson::to_document(&DelegationDoc {
            tx_hash: env.tx_hash.clone(),
            log_index: env.log_index as i64,
            delegator: delegator.clone(),
            from_delegate: from_delegate.to_lowercase(),
            to_delegate: to_delegate.clone(),
            block_number: env.block_number as i64,
            changed_at: env.block_timestamp as i64,
            ..Default::default()
        })?;
        self.store()
            .insert_or_ignore(
                Entity::Delegations,
                DelegationDoc::key(&env.tx_hash, env.log_index),
                row,
            )
            .await?;

        // Voters are created lazily on first delegation
        self.touch_voter(&delegator, env.block_timestamp, doc! {}).await?;
        self.touch_voter(&to_delegate, env.block_timestamp, doc! {}).await?;

        // Both display identities in one batch
        let identities = self
            .identity()
            .resolve_batch(&[delegator.clone(), to_delegate.clone()])
            .await;
        for (address, identity) in identities {
            self.persist_identity(&address, &identity).await?;
        }

        Ok(())
    }

    pub(crate) async fn on_delegate_votes_changed(
        &self,
        env: &EventEnvelope,
        delegate: &str,
        _previous_weight: u64,
        new_weight: u64,
    ) -> Result<()> {
        let delegate = delegate.to_lowercase();
        self.touch_voter(
            &delegate,
            env.block_timestamp,
            doc! { "$set": { "weight": new_weight as i64 } },
        )
        .await
    }

    /// Ensure a voter row exists and apply a change plus seen-window
    /// bounds (first_seen only moves backward, last_seen only forward)
    async fn touch_voter(&self, address: &str, seen_at: u64, mut change: Document) -> Result<()> {
        change.insert("$max", doc! { "last_seen": seen_at as i64 });
        change.insert("$min", doc! { "first_seen": seen_at as i64 });

        let placeholder = bson::to_document(&VoterDoc::placeholder(address, seen_at))?;
        ensure_and_update(
            self.store(),
            Entity::Voters,
            VoterDoc::key(address),
            placeholder,
            change,
        )
        .await
    }

    /// Persist a resolved display identity onto the voter row
    async fn persist_identity(&self, address: &str, identity: &Identity) -> Result<()> {
        if identity.is_empty() {
            return Ok(());
        }
        let mut set = Document::new();
        if let Some(name) = &identity.name {
            set.insert("name", name);
        }
        if let Some(avatar) = &identity.avatar {
            set.insert("avatar", avatar);
        }
        self.store()
            .update(Entity::Voters, VoterDoc::key(address), doc! { "$set": set })
            .await?;
        Ok(())
    }
}
