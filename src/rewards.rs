//! Reward-Cycle Eligibility Engine
//!
//! Classifies every proposal at or after the rewarded-cursor cutoff into
//! eligible / pending / ineligible, evaluates the distribution trigger,
//! and estimates the per-client reward breakdown. The core is pure over
//! typed rows; `evaluate` is the thin loader that reads the store and the
//! live economic parameters.
//!
//! The trigger's time condition is anchored to the creation timestamp of
//! the most-recently-created eligible proposal, not to wall-clock time, so
//! two observers evaluating at different times agree once they share the
//! same eligible-proposal set.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::db::schemas::{reward_cursor, ProposalDoc, ProposalStatus, VoteDoc};
use crate::db::{Entity, Store};
use crate::types::Result;

/// On-chain economic parameters for reward eligibility
#[derive(Debug, Clone, Serialize)]
pub struct RewardParams {
    /// Minimum period between distributions, in seconds
    pub minimum_reward_period_secs: u64,
    /// Eligible-proposal count that permits a distribution on its own
    pub proposals_enough_for_reward: u32,
    /// Eligibility quorum as basis points of each proposal's recorded
    /// quorum (10000 = exactly the proposal quorum)
    pub eligibility_quorum_bps: u32,
}

/// Revenue pool and its basis-point split
#[derive(Debug, Clone, Serialize)]
pub struct RevenuePool {
    /// Total revenue to distribute, in wei
    pub revenue_wei: u128,
    /// Share paid across eligible proposals
    pub proposal_reward_bps: u32,
    /// Share paid across client-attributed votes
    pub voting_reward_bps: u32,
}

/// Eligibility classification of one proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardEligibility {
    /// For-votes reached quorum; qualifies regardless of final outcome
    Eligible,
    /// Could still become eligible
    Pending,
    /// Terminal without quorum, or cancelled/vetoed
    Ineligible,
}

/// Classify one proposal against the eligibility rules
pub fn classify(proposal: &ProposalDoc, params: &RewardParams) -> RewardEligibility {
    // Cancelled and vetoed proposals never qualify, whatever their votes
    if matches!(
        proposal.status,
        ProposalStatus::Cancelled | ProposalStatus::Vetoed
    ) {
        return RewardEligibility::Ineligible;
    }

    let quorum = eligibility_quorum(proposal.quorum, params.eligibility_quorum_bps);
    if proposal.for_votes >= quorum {
        // Early-quorum short-circuit: eligible even while voting is open
        return RewardEligibility::Eligible;
    }

    if proposal.status.voting_concluded() {
        RewardEligibility::Ineligible
    } else {
        RewardEligibility::Pending
    }
}

/// Per-proposal eligibility quorum, never below one vote
///
/// A forward-reference placeholder records a zero quorum; it must not be
/// auto-eligible before its creation event arrives.
fn eligibility_quorum(quorum: i64, bps: u32) -> i64 {
    ((quorum as i128 * bps as i128) / 10_000).max(1) as i64
}

/// Evaluate the distribution trigger over the eligible set
///
/// Permitted only if at least one eligible proposal exists and either the
/// eligible count reaches the configured threshold or the newest eligible
/// proposal was created at least the minimum period after the last
/// distribution.
pub fn distribution_permitted(
    eligible: &[&ProposalDoc],
    last_distribution_at: u64,
    params: &RewardParams,
) -> bool {
    if eligible.is_empty() {
        return false;
    }
    if eligible.len() as u32 >= params.proposals_enough_for_reward {
        return true;
    }

    let newest_created = eligible
        .iter()
        .filter_map(|p| p.created_at)
        .max()
        .unwrap_or(0);
    newest_created >= last_distribution_at as i64 + params.minimum_reward_period_secs as i64
}

/// One client's share of a proposal's rewards
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientShare {
    pub client_id: i64,
    /// Share of the proposal pool, in wei
    pub proposal_reward_wei: u128,
    /// Share of the vote pool, in wei
    pub vote_reward_wei: u128,
    /// Client-attributed vote weight on this proposal
    pub vote_weight: i64,
}

impl ClientShare {
    pub fn total_wei(&self) -> u128 {
        self.proposal_reward_wei + self.vote_reward_wei
    }
}

/// Estimated rewards for one eligible proposal
#[derive(Debug, Clone, Serialize)]
pub struct ProposalRewards {
    pub proposal_id: i64,
    /// Ranked shares: proposing client first, then voting clients by
    /// weight descending; a client appearing in both roles is merged
    pub shares: Vec<ClientShare>,
}

/// Estimate the per-client reward breakdown across the eligible set
///
/// Per-proposal reward is the proposal pool divided by the eligible
/// count; per-vote reward is the vote pool divided by the total
/// client-attributed vote weight across all eligible proposals.
pub fn reward_breakdown(
    eligible: &[&ProposalDoc],
    votes_by_proposal: &HashMap<i64, Vec<VoteDoc>>,
    pool: &RevenuePool,
) -> Vec<ProposalRewards> {
    if eligible.is_empty() {
        return Vec::new();
    }

    let proposal_pool = pool.revenue_wei * pool.proposal_reward_bps as u128 / 10_000;
    let vote_pool = pool.revenue_wei * pool.voting_reward_bps as u128 / 10_000;
    let per_proposal = proposal_pool / eligible.len() as u128;

    let total_attributed_weight: i64 = eligible
        .iter()
        .flat_map(|p| votes_by_proposal.get(&p.id).into_iter().flatten())
        .filter(|v| v.client_id.is_some())
        .map(|v| v.weight)
        .sum();
    let per_vote = if total_attributed_weight > 0 {
        vote_pool / total_attributed_weight as u128
    } else {
        0
    };

    eligible
        .iter()
        .map(|proposal| {
            // Client-attributed vote weight on this proposal
            let mut weight_by_client: HashMap<i64, i64> = HashMap::new();
            for vote in votes_by_proposal.get(&proposal.id).into_iter().flatten() {
                if let Some(client_id) = vote.client_id {
                    *weight_by_client.entry(client_id).or_default() += vote.weight;
                }
            }

            let mut shares: Vec<ClientShare> = Vec::new();
            if let Some(proposer_client) = proposal.client_id {
                let vote_weight = weight_by_client.remove(&proposer_client).unwrap_or(0);
                shares.push(ClientShare {
                    client_id: proposer_client,
                    proposal_reward_wei: per_proposal,
                    vote_reward_wei: per_vote * vote_weight as u128,
                    vote_weight,
                });
            }

            let mut voting: Vec<ClientShare> = weight_by_client
                .into_iter()
                .map(|(client_id, vote_weight)| ClientShare {
                    client_id,
                    proposal_reward_wei: 0,
                    vote_reward_wei: per_vote * vote_weight as u128,
                    vote_weight,
                })
                .collect();
            voting.sort_by(|a, b| {
                b.vote_weight
                    .cmp(&a.vote_weight)
                    .then(a.client_id.cmp(&b.client_id))
            });
            shares.extend(voting);

            ProposalRewards {
                proposal_id: proposal.id,
                shares,
            }
        })
        .collect()
}

/// Full report of one reward-cycle evaluation
#[derive(Debug, Serialize)]
pub struct RewardCycleReport {
    /// First not-yet-rewarded proposal id (the classification cutoff)
    pub cutoff_id: u64,
    pub last_distribution_at: u64,
    pub eligible: Vec<i64>,
    pub pending: Vec<i64>,
    pub ineligible: Vec<i64>,
    pub distribution_permitted: bool,
    pub breakdown: Vec<ProposalRewards>,
}

/// Evaluate the current reward cycle against the materialized state
pub async fn evaluate(
    store: &dyn Store,
    params: &RewardParams,
    pool: &RevenuePool,
) -> Result<RewardCycleReport> {
    let cursor = store
        .find_one(
            Entity::RewardCursors,
            bson::doc! { "id": reward_cursor::PROPOSALS },
        )
        .await?;
    let cutoff_id = cursor
        .as_ref()
        .and_then(|c| c.get_i64("next_id").ok())
        .unwrap_or(0)
        .max(0) as u64;
    let last_distribution_at = cursor
        .as_ref()
        .and_then(|c| c.get_i64("last_distribution_at").ok())
        .unwrap_or(0)
        .max(0) as u64;

    let rows = store
        .find_many(Entity::Proposals, ProposalDoc::rewardable_filter(cutoff_id))
        .await?;
    let mut proposals: Vec<ProposalDoc> = Vec::with_capacity(rows.len());
    for row in rows {
        proposals.push(bson::from_document(row)?);
    }
    proposals.sort_by_key(|p| p.id);

    let mut eligible: Vec<&ProposalDoc> = Vec::new();
    let mut pending: Vec<i64> = Vec::new();
    let mut ineligible: Vec<i64> = Vec::new();
    for proposal in &proposals {
        match classify(proposal, params) {
            RewardEligibility::Eligible => eligible.push(proposal),
            RewardEligibility::Pending => pending.push(proposal.id),
            RewardEligibility::Ineligible => ineligible.push(proposal.id),
        }
    }

    let mut votes_by_proposal: HashMap<i64, Vec<VoteDoc>> = HashMap::new();
    for proposal in &eligible {
        let rows = store
            .find_many(Entity::Votes, VoteDoc::for_proposal(proposal.id as u64))
            .await?;
        let mut votes = Vec::with_capacity(rows.len());
        for row in rows {
            votes.push(bson::from_document::<VoteDoc>(row)?);
        }
        votes_by_proposal.insert(proposal.id, votes);
    }

    let permitted = distribution_permitted(&eligible, last_distribution_at, params);
    let breakdown = reward_breakdown(&eligible, &votes_by_proposal, pool);

    debug!(
        cutoff_id,
        eligible = eligible.len(),
        pending = pending.len(),
        ineligible = ineligible.len(),
        permitted,
        "reward cycle evaluated"
    );

    Ok(RewardCycleReport {
        cutoff_id,
        last_distribution_at,
        eligible: eligible.iter().map(|p| p.id).collect(),
        pending,
        ineligible,
        distribution_permitted: permitted,
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RewardParams {
        RewardParams {
            minimum_reward_period_secs: 1_000,
            proposals_enough_for_reward: 5,
            eligibility_quorum_bps: 10_000,
        }
    }

    fn proposal(id: i64, status: ProposalStatus, for_votes: i64, quorum: i64) -> ProposalDoc {
        ProposalDoc {
            id,
            status,
            for_votes,
            quorum,
            created_at: Some(10_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_cancelled_with_quorum_is_still_ineligible() {
        let p = proposal(1, ProposalStatus::Cancelled, 100, 80);
        assert_eq!(classify(&p, &params()), RewardEligibility::Ineligible);

        let v = proposal(2, ProposalStatus::Vetoed, 100, 80);
        assert_eq!(classify(&v, &params()), RewardEligibility::Ineligible);
    }

    #[test]
    fn test_active_at_quorum_is_eligible_early() {
        let p = proposal(1, ProposalStatus::Active, 80, 80);
        assert_eq!(classify(&p, &params()), RewardEligibility::Eligible);
    }

    #[test]
    fn test_active_below_quorum_is_pending() {
        let p = proposal(1, ProposalStatus::Active, 79, 80);
        assert_eq!(classify(&p, &params()), RewardEligibility::Pending);
    }

    #[test]
    fn test_concluded_below_quorum_is_ineligible() {
        for status in [
            ProposalStatus::Defeated,
            ProposalStatus::Succeeded,
            ProposalStatus::Queued,
            ProposalStatus::Executed,
            ProposalStatus::ObjectionPeriod,
        ] {
            let p = proposal(1, status, 10, 80);
            assert_eq!(classify(&p, &params()), RewardEligibility::Ineligible);
        }
    }

    #[test]
    fn test_quorum_bps_scales_the_bar() {
        let mut params = params();
        params.eligibility_quorum_bps = 5_000;
        let p = proposal(1, ProposalStatus::Active, 40, 80);
        assert_eq!(classify(&p, &params), RewardEligibility::Eligible);
    }

    #[test]
    fn test_zero_quorum_placeholder_is_not_auto_eligible() {
        let p = proposal(1, ProposalStatus::Pending, 0, 0);
        assert_eq!(classify(&p, &params()), RewardEligibility::Pending);
    }

    #[test]
    fn test_trigger_requires_an_eligible_proposal() {
        assert!(!distribution_permitted(&[], 0, &params()));
    }

    #[test]
    fn test_trigger_count_threshold() {
        let proposals: Vec<ProposalDoc> = (1..=5)
            .map(|id| proposal(id, ProposalStatus::Active, 100, 80))
            .collect();
        let refs: Vec<&ProposalDoc> = proposals.iter().collect();
        // Newest creation is nowhere near the period, but the count is
        assert!(distribution_permitted(&refs, 10_000, &params()));
    }

    #[test]
    fn test_trigger_time_boundary_is_inclusive() {
        let last = 10_000_u64;
        let period = params().minimum_reward_period_secs;

        let mut early = proposal(1, ProposalStatus::Active, 100, 80);
        early.created_at = Some((last + period - 1) as i64);
        assert!(!distribution_permitted(&[&early], last, &params()));

        let mut on_time = proposal(1, ProposalStatus::Active, 100, 80);
        on_time.created_at = Some((last + period) as i64);
        assert!(distribution_permitted(&[&on_time], last, &params()));
    }

    fn attributed_vote(proposal_id: i64, client_id: i64, weight: i64) -> VoteDoc {
        VoteDoc {
            tx_hash: format!("0x{proposal_id}-{client_id}"),
            proposal_id,
            voter: "0xv".to_string(),
            client_id: Some(client_id),
            weight,
            ..Default::default()
        }
    }

    #[test]
    fn test_breakdown_ranks_proposer_first_then_weight() {
        let mut p = proposal(1, ProposalStatus::Active, 100, 80);
        p.client_id = Some(7);
        let eligible = vec![&p];

        let mut votes = HashMap::new();
        votes.insert(
            1,
            vec![
                attributed_vote(1, 3, 50),
                attributed_vote(1, 9, 20),
                // Proposer's client also voted; its components merge
                attributed_vote(1, 7, 5),
                // Unattributed vote contributes to nothing
                VoteDoc {
                    tx_hash: "0xplain".to_string(),
                    proposal_id: 1,
                    voter: "0xw".to_string(),
                    weight: 30,
                    ..Default::default()
                },
            ],
        );

        let pool = RevenuePool {
            revenue_wei: 1_000_000,
            proposal_reward_bps: 100,
            voting_reward_bps: 50,
        };
        let breakdown = reward_breakdown(&eligible, &votes, &pool);
        assert_eq!(breakdown.len(), 1);

        let shares = &breakdown[0].shares;
        // proposal pool = 10_000, vote pool = 5_000 over weight 75
        let per_vote = 5_000 / 75;
        assert_eq!(
            shares[0],
            ClientShare {
                client_id: 7,
                proposal_reward_wei: 10_000,
                vote_reward_wei: per_vote * 5,
                vote_weight: 5,
            }
        );
        assert_eq!(shares[1].client_id, 3);
        assert_eq!(shares[1].vote_reward_wei, per_vote * 50);
        assert_eq!(shares[2].client_id, 9);
        assert_eq!(shares[0].total_wei(), 10_000 + per_vote * 5);
    }

    #[test]
    fn test_breakdown_splits_proposal_pool_across_eligible() {
        let mut a = proposal(1, ProposalStatus::Active, 100, 80);
        a.client_id = Some(1);
        let mut b = proposal(2, ProposalStatus::Active, 100, 80);
        b.client_id = Some(2);
        let eligible = vec![&a, &b];

        let pool = RevenuePool {
            revenue_wei: 1_000_000,
            proposal_reward_bps: 100,
            voting_reward_bps: 50,
        };
        let breakdown = reward_breakdown(&eligible, &HashMap::new(), &pool);
        for rewards in &breakdown {
            assert_eq!(rewards.shares[0].proposal_reward_wei, 5_000);
            assert_eq!(rewards.shares[0].vote_reward_wei, 0);
        }
    }

    mod evaluate {
        use super::*;
        use crate::db::schemas::{RewardCursorDoc, VoterDoc};
        use crate::db::MemoryStore;

        async fn seed_proposal(store: &MemoryStore, p: &ProposalDoc) {
            store
                .insert_or_ignore(
                    Entity::Proposals,
                    ProposalDoc::key(p.id as u64),
                    bson::to_document(p).unwrap(),
                )
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_evaluate_reads_cursor_and_classifies() {
            let store = MemoryStore::new();

            // Cursor: proposals below 10 are already rewarded
            store
                .insert_or_ignore(
                    Entity::RewardCursors,
                    RewardCursorDoc::key(reward_cursor::PROPOSALS),
                    bson::to_document(&RewardCursorDoc {
                        id: reward_cursor::PROPOSALS.to_string(),
                        next_id: 10,
                        last_distribution_at: 5_000,
                        ..Default::default()
                    })
                    .unwrap(),
                )
                .await
                .unwrap();

            // Below the cutoff: ignored entirely
            seed_proposal(&store, &proposal(5, ProposalStatus::Executed, 500, 80)).await;
            // At the cutoff: eligible
            let mut p10 = proposal(10, ProposalStatus::Active, 100, 80);
            p10.client_id = Some(1);
            p10.created_at = Some(6_500);
            seed_proposal(&store, &p10).await;
            // Pending and ineligible companions
            seed_proposal(&store, &proposal(11, ProposalStatus::Active, 10, 80)).await;
            seed_proposal(&store, &proposal(12, ProposalStatus::Cancelled, 500, 80)).await;

            // One attributed vote on the eligible proposal
            store
                .insert_or_ignore(
                    Entity::Votes,
                    VoteDoc::key("0xa", 10, "0xv"),
                    bson::to_document(&attributed_vote(10, 4, 25)).unwrap(),
                )
                .await
                .unwrap();
            // Unrelated voter row must not disturb the engine
            store
                .insert_or_ignore(
                    Entity::Voters,
                    VoterDoc::key("0xv"),
                    bson::to_document(&VoterDoc::placeholder("0xv", 1)).unwrap(),
                )
                .await
                .unwrap();

            let pool = RevenuePool {
                revenue_wei: 1_000_000,
                proposal_reward_bps: 100,
                voting_reward_bps: 50,
            };
            let report = evaluate(&store, &params(), &pool).await.unwrap();

            assert_eq!(report.cutoff_id, 10);
            assert_eq!(report.eligible, vec![10]);
            assert_eq!(report.pending, vec![11]);
            assert_eq!(report.ineligible, vec![12]);
            // 6_500 >= 5_000 + 1_000
            assert!(report.distribution_permitted);

            let shares = &report.breakdown[0].shares;
            assert_eq!(shares[0].client_id, 1);
            assert_eq!(shares[0].proposal_reward_wei, 10_000);
            assert_eq!(shares[1].client_id, 4);
            assert_eq!(shares[1].vote_weight, 25);
        }

        #[tokio::test]
        async fn test_evaluate_without_cursor_covers_everything() {
            let store = MemoryStore::new();
            seed_proposal(&store, &proposal(1, ProposalStatus::Active, 100, 80)).await;

            let pool = RevenuePool {
                revenue_wei: 0,
                proposal_reward_bps: 100,
                voting_reward_bps: 50,
            };
            let report = evaluate(&store, &params(), &pool).await.unwrap();
            assert_eq!(report.cutoff_id, 0);
            assert_eq!(report.eligible, vec![1]);
        }
    }
}
