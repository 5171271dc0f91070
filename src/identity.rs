//! Identity Resolution Cache
//!
//! Resolves chain addresses to display names/avatars via an external HTTP
//! lookup service. Results are memoized keyed by lower-cased address with
//! a configurable TTL (0 = process lifetime). Lookups that fail or return
//! not-found are cached as empty identities so a permanently-unresolvable
//! address is not re-fetched in a hot loop. The resolver never returns an
//! error to callers - a failed lookup degrades to the empty identity.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::events::is_zero_address;

/// Maximum concurrent in-flight lookups per batch
const BATCH_CHUNK_SIZE: usize = 10;

/// Configuration for the identity resolver
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL of the lookup service; `None` disables resolution
    pub base_url: Option<String>,
    /// Cache TTL; `None` caches for the process lifetime
    pub cache_ttl: Option<Duration>,
    /// Timeout for HTTP requests
    pub request_timeout: Duration,
    /// Maximum cache entries before eviction
    pub max_cache_entries: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            cache_ttl: None,
            request_timeout: Duration::from_secs(5),
            max_cache_entries: 10_000,
        }
    }
}

/// Resolved display identity for an address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Identity {
    /// Empty identity, used for the zero address and failed lookups
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar.is_none()
    }
}

/// Cached identity with expiration
struct CachedIdentity {
    identity: Identity,
    expires_at: Option<Instant>,
}

impl CachedIdentity {
    fn is_live(&self) -> bool {
        self.expires_at.map(|at| at > Instant::now()).unwrap_or(true)
    }
}

/// Identity resolution service with process-lifetime memoization
pub struct IdentityResolver {
    config: IdentityConfig,
    cache: RwLock<HashMap<String, CachedIdentity>>,
    http_client: reqwest::Client,
}

impl IdentityResolver {
    /// Create a resolver with default configuration (resolution disabled)
    pub fn new() -> Self {
        Self::with_config(IdentityConfig::default())
    }

    /// Create a resolver with custom configuration
    pub fn with_config(config: IdentityConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("gazette/1.0")
            .build()
            .unwrap_or_default();

        Self {
            config,
            cache: RwLock::new(HashMap::new()),
            http_client,
        }
    }

    /// Resolve one address to its display identity
    ///
    /// The zero address short-circuits to the empty identity without a
    /// lookup or cache entry.
    pub async fn resolve(&self, address: &str) -> Identity {
        if is_zero_address(address) {
            return Identity::empty();
        }

        let key = address.to_lowercase();
        if let Some(identity) = self.get_cached(&key).await {
            debug!(address = %key, "identity resolved from cache");
            return identity;
        }

        let identity = self.lookup(&key).await;
        self.cache_identity(&key, identity.clone()).await;
        identity
    }

    /// Resolve a batch of addresses, deduplicated, with at most
    /// `BATCH_CHUNK_SIZE` lookups in flight at once
    ///
    /// The returned map covers every input address.
    pub async fn resolve_batch(&self, addresses: &[String]) -> HashMap<String, Identity> {
        let mut results = HashMap::new();
        let mut pending: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for address in addresses {
            let key = address.to_lowercase();
            if !seen.insert(key.clone()) {
                continue;
            }
            if is_zero_address(&key) {
                results.insert(key, Identity::empty());
                continue;
            }
            if let Some(identity) = self.get_cached(&key).await {
                results.insert(key, identity);
                continue;
            }
            pending.push(key);
        }

        for chunk in pending.chunks(BATCH_CHUNK_SIZE) {
            let lookups = chunk.iter().map(|key| async {
                let identity = self.lookup(key).await;
                (key.clone(), identity)
            });
            for (key, identity) in futures::future::join_all(lookups).await {
                self.cache_identity(&key, identity.clone()).await;
                results.insert(key, identity);
            }
        }

        results
    }

    /// Get a cached identity if still valid
    async fn get_cached(&self, key: &str) -> Option<Identity> {
        let cache = self.cache.read().await;
        cache.get(key).and_then(|cached| {
            if cached.is_live() {
                Some(cached.identity.clone())
            } else {
                None
            }
        })
    }

    /// Cache an identity, evicting when the cache is full
    async fn cache_identity(&self, key: &str, identity: Identity) {
        let mut cache = self.cache.write().await;

        if cache.len() >= self.config.max_cache_entries {
            // Remove expired entries first
            cache.retain(|_, v| v.is_live());

            // If still too full, drop half (simple eviction)
            if cache.len() >= self.config.max_cache_entries {
                let to_remove: Vec<_> = cache.keys().take(cache.len() / 2).cloned().collect();
                for key in to_remove {
                    cache.remove(&key);
                }
            }
        }

        cache.insert(
            key.to_string(),
            CachedIdentity {
                identity,
                expires_at: self.config.cache_ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    /// Perform one external lookup; failures degrade to the empty identity
    async fn lookup(&self, address: &str) -> Identity {
        let Some(base_url) = &self.config.base_url else {
            return Identity::empty();
        };

        let url = format!("{}/v1/identity/{}", base_url.trim_end_matches('/'), address);
        debug!(address = %address, url = %url, "looking up identity");

        let response = match self.http_client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(address = %address, "identity lookup failed: {}", e);
                return Identity::empty();
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Identity::empty();
        }

        if !response.status().is_success() {
            warn!(
                address = %address,
                status = %response.status(),
                "identity lookup returned an error status"
            );
            return Identity::empty();
        }

        match response.json::<Identity>().await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(address = %address, "malformed identity response: {}", e);
                Identity::empty()
            }
        }
    }

    /// Cache statistics
    pub async fn cache_stats(&self) -> IdentityCacheStats {
        let cache = self.cache.read().await;
        let live_entries = cache.values().filter(|v| v.is_live()).count();

        IdentityCacheStats {
            total_entries: cache.len(),
            live_entries,
            expired_entries: cache.len() - live_entries,
        }
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity cache statistics
#[derive(Debug, Clone)]
pub struct IdentityCacheStats {
    pub total_entries: usize,
    pub live_entries: usize,
    pub expired_entries: usize,
}
