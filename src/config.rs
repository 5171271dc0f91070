//! Configuration for Gazette
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;

/// Gazette - projection engine for Nouns protocol events
///
/// Consumes a decoded event feed (NDJSON on stdin) and materializes
/// queryable entity collections plus a reward-cycle eligibility report.
#[derive(Parser, Debug, Clone)]
#[command(name = "gazette")]
#[command(about = "Projection engine for Nouns protocol events")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "gazette")]
    pub mongodb_db: String,

    /// Enable development mode (falls back to the in-memory store when
    /// MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Base URL of the identity lookup service
    /// (e.g., "https://identity.example.org"); unset disables resolution
    #[arg(long, env = "IDENTITY_URL")]
    pub identity_url: Option<String>,

    /// Identity lookup request timeout in milliseconds
    #[arg(long, env = "IDENTITY_TIMEOUT_MS", default_value = "5000")]
    pub identity_timeout_ms: u64,

    /// Identity cache TTL in seconds (0 = cache for the process lifetime)
    #[arg(long, env = "IDENTITY_CACHE_TTL_SECS", default_value = "0")]
    pub identity_cache_ttl_secs: u64,

    /// Maximum identity cache entries before eviction
    #[arg(long, env = "IDENTITY_MAX_CACHE_ENTRIES", default_value = "10000")]
    pub identity_max_cache_entries: usize,

    /// Base URL of the artwork renderer service; unset leaves derived
    /// artwork fields empty
    #[arg(long, env = "RENDERER_URL")]
    pub renderer_url: Option<String>,

    /// Artwork render request timeout in milliseconds
    #[arg(long, env = "RENDERER_TIMEOUT_MS", default_value = "10000")]
    pub renderer_timeout_ms: u64,

    /// Ordered artwork descriptor sources as "sourceId:startBlock" pairs,
    /// comma-separated (e.g., "descriptor-v1:0,descriptor-v2:13000000")
    #[arg(long, env = "DESCRIPTOR_SOURCES", default_value = "")]
    pub descriptor_sources: String,

    /// Number of reconciler workers (concurrent transaction lanes)
    #[arg(long, env = "WORKER_COUNT", default_value = "4")]
    pub worker_count: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Minimum reward period between distributions, in seconds
    #[arg(long, env = "MINIMUM_REWARD_PERIOD_SECS", default_value = "1209600")]
    pub minimum_reward_period_secs: u64,

    /// Count of eligible proposals that permits a distribution on its own
    #[arg(long, env = "PROPOSALS_ENOUGH_FOR_REWARD", default_value = "5")]
    pub proposals_enough_for_reward: u32,

    /// Eligibility quorum as basis points of each proposal's recorded
    /// quorum (10000 = exactly the proposal quorum)
    #[arg(long, env = "ELIGIBILITY_QUORUM_BPS", default_value = "10000")]
    pub eligibility_quorum_bps: u32,

    /// Auction revenue pool for reward estimation, in wei
    #[arg(long, env = "REWARD_REVENUE_WEI", default_value = "0")]
    pub reward_revenue_wei: String,

    /// Share of the revenue pool paid per proposal, in basis points
    #[arg(long, env = "PROPOSAL_REWARD_BPS", default_value = "100")]
    pub proposal_reward_bps: u32,

    /// Share of the revenue pool paid per vote, in basis points
    #[arg(long, env = "VOTING_REWARD_BPS", default_value = "50")]
    pub voting_reward_bps: u32,
}

impl Args {
    /// Parse the descriptor source list into (id, start block) pairs
    pub fn descriptor_source_list(&self) -> Result<Vec<(String, u64)>, String> {
        let mut sources = Vec::new();
        for entry in self.descriptor_sources.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (id, block) = entry
                .rsplit_once(':')
                .ok_or_else(|| format!("Malformed descriptor source '{entry}', expected id:startBlock"))?;
            let block: u64 = block
                .parse()
                .map_err(|_| format!("Malformed start block in descriptor source '{entry}'"))?;
            if id.is_empty() {
                return Err(format!("Empty source id in descriptor source '{entry}'"));
            }
            sources.push((id.to_string(), block));
        }
        Ok(sources)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("WORKER_COUNT must be at least 1".to_string());
        }

        self.descriptor_source_list()?;

        if self.reward_revenue_wei.parse::<u128>().is_err() {
            return Err("REWARD_REVENUE_WEI must be a decimal wei amount".to_string());
        }

        if self.proposal_reward_bps + self.voting_reward_bps > 10_000 {
            return Err("PROPOSAL_REWARD_BPS + VOTING_REWARD_BPS must not exceed 10000".to_string());
        }

        Ok(())
    }
}
