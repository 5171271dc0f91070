//! Gazette - projection engine for Nouns protocol events
//!
//! Gazette consumes an append-only, at-least-once stream of decoded log
//! events (token transfers, auction lifecycle, governance, client
//! incentives) and maintains queryable derived entities in MongoDB.
//!
//! ## Components
//!
//! - **Reconciler** (`ingest`): per event-type handlers mapping one event
//!   to idempotent natural-key upserts; tolerates forward references and
//!   either arrival order for causally-linked event pairs
//! - **Identity cache** (`identity`): memoized, batched, concurrency-
//!   capped address-to-display-name resolution
//! - **Artwork resolver** (`artwork`): block-height-gated descriptor
//!   source selection plus the renderer/metrics collaborator seams
//! - **Eligibility engine** (`rewards`): reward-cycle classification,
//!   distribution trigger, and per-client breakdown estimation

pub mod artwork;
pub mod config;
pub mod db;
pub mod events;
pub mod feed;
pub mod identity;
pub mod ingest;
pub mod rewards;
pub mod types;

pub use config::Args;
pub use types::{GazetteError, Result};
