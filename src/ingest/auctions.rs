//! Auction handlers: open, bid, extension, settlement
//!
//! Settlement fans out to two entities: the auction row (primary) and the
//! noun row (best-effort mirror of the same winner/settler/amount data).
//! The noun update is tolerated as a no-op when the row does not exist
//! yet, which can only happen for the very first auction in the system.

use bson::doc;
use tracing::debug;

use crate::db::schemas::{AuctionBidDoc, AuctionDoc, NounDoc};
use crate::db::Entity;
use crate::events::EventEnvelope;
use crate::ingest::{ensure_and_update, Reconciler};
use crate::types::Result;

impl Reconciler {
    pub(crate) async fn on_auction_created(
        &self,
        noun_id: u64,
        start_time: u64,
        end_time: u64,
    ) -> Result<()> {
        let key = AuctionDoc::key(noun_id);
        let row = bson::to_document(&AuctionDoc {
            noun_id: noun_id as i64,
            start_time: start_time as i64,
            end_time: end_time as i64,
            ..Default::default()
        })?;
        self.store()
            .insert_or_ignore(Entity::Auctions, key.clone(), row)
            .await?;

        // Redelivery after later lifecycle events must not roll the row
        // back: start time is immutable, end time only moves forward
        self.store()
            .update(
                Entity::Auctions,
                key,
                doc! {
                    "$set": { "start_time": start_time as i64 },
                    "$max": { "end_time": end_time as i64 },
                },
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn on_auction_bid_placed(
        &self,
        env: &EventEnvelope,
        noun_id: u64,
        bidder: &str,
        amount: &str,
        extended: bool,
    ) -> Result<()> {
        let fields = doc! {
            "bidder": bidder,
            "amount": amount,
            "extended": extended,
            "block_number": env.block_number as i64,
            "placed_at": env.block_timestamp as i64,
        };
        self.store()
            .insert_or_merge(
                Entity::AuctionBids,
                AuctionBidDoc::key(&env.tx_hash, noun_id),
                fields,
            )
            .await
    }

    pub(crate) async fn on_auction_bid_client_attributed(
        &self,
        env: &EventEnvelope,
        noun_id: u64,
        client_id: u32,
    ) -> Result<()> {
        let key = AuctionBidDoc::key(&env.tx_hash, noun_id);
        self.store()
            .insert_or_merge(Entity::AuctionBids, key.clone(), doc! { "client_id": client_id as i64 })
            .await?;

        // If the auction already settled on this bid, mirror the
        // attribution onto the auction row so both arrival orders of the
        // settlement/attribution pair converge
        if let Some(bid) = self.store().find_one(Entity::AuctionBids, key).await? {
            self.attribute_settled_auction(noun_id, &bid).await?;
        }
        Ok(())
    }

    pub(crate) async fn on_auction_extended(&self, noun_id: u64, end_time: u64) -> Result<()> {
        let row = bson::to_document(&AuctionDoc {
            noun_id: noun_id as i64,
            ..Default::default()
        })?;
        ensure_and_update(
            self.store(),
            Entity::Auctions,
            AuctionDoc::key(noun_id),
            row,
            doc! { "$max": { "end_time": end_time as i64 } },
        )
        .await
    }

    pub(crate) async fn on_auction_settled(
        &self,
        env: &EventEnvelope,
        noun_id: u64,
        winner: &str,
        amount: &str,
    ) -> Result<()> {
        let set = doc! {
            "settled": true,
            "winner": winner,
            "amount": amount,
            "settler": &env.tx_sender,
            "settled_at": env.block_timestamp as i64,
        };
        self.store()
            .insert_or_merge(Entity::Auctions, AuctionDoc::key(noun_id), set)
            .await?;

        // Best-effort mirror onto the noun row
        let matched = self
            .store()
            .update(
                Entity::Nouns,
                NounDoc::key(noun_id),
                doc! { "$set": {
                    "winner": winner,
                    "settler": &env.tx_sender,
                    "settlement_amount": amount,
                    "settled_at": env.block_timestamp as i64,
                }},
            )
            .await?;
        if !matched {
            debug!(noun_id, "settlement for a noun with no row yet, tolerated");
        }

        // Pull client attribution from the winning bid when it is known
        let bids = self
            .store()
            .find_many(Entity::AuctionBids, doc! { "noun_id": noun_id as i64 })
            .await?;
        if let Some(bid) = bids.iter().find(|bid| {
            bid.get_str("bidder").ok() == Some(winner)
                && bid.get_str("amount").ok() == Some(amount)
                && bid.get("client_id").is_some()
        }) {
            if let Ok(client_id) = bid.get_i64("client_id") {
                self.store()
                    .update(
                        Entity::Auctions,
                        AuctionDoc::key(noun_id),
                        doc! { "$set": { "client_id": client_id } },
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Copy a bid's client attribution to the auction when that bid won
    async fn attribute_settled_auction(
        &self,
        noun_id: u64,
        bid: &bson::Document,
    ) -> Result<()> {
        let Ok(client_id) = bid.get_i64("client_id") else {
            return Ok(());
        };
        let Some(auction) = self
            .store()
            .find_one(Entity::Auctions, AuctionDoc::key(noun_id))
            .await?
        else {
            return Ok(());
        };

        let settled = auction.get_bool("settled").unwrap_or(false);
        let winner_matches = auction.get_str("winner").ok() == bid.get_str("bidder").ok()
            && auction.get_str("amount").ok() == bid.get_str("amount").ok();
        if settled && winner_matches {
            self.store()
                .update(
                    Entity::Auctions,
                    AuctionDoc::key(noun_id),
                    doc! { "$set": { "client_id": client_id } },
                )
                .await?;
        }
        Ok(())
    }
}
