//! Artwork descriptor selection and collaborator seams
//!
//! Several rendering sources are deployed over time; each becomes valid
//! at a threshold block. For a given block the most recent source whose
//! threshold has been reached is selected. The renderer and trait-metrics
//! calculator are external collaborators behind traits; renderer failure
//! degrades to an empty artwork field, never to a failed event.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::db::schemas::{NounMetrics, NounSeed};
use crate::types::{GazetteError, Result};

/// One rendering source with its validity threshold
#[derive(Debug, Clone)]
pub struct DescriptorSource {
    pub id: String,
    /// First block at which this source is valid
    pub start_block: u64,
}

/// Ordered registry of rendering sources
#[derive(Debug, Clone, Default)]
pub struct DescriptorRegistry {
    /// Sorted ascending by start block
    sources: Vec<DescriptorSource>,
}

impl DescriptorRegistry {
    pub fn new(mut sources: Vec<DescriptorSource>) -> Self {
        sources.sort_by_key(|s| s.start_block);
        Self { sources }
    }

    /// Build a registry from parsed (id, start block) pairs
    pub fn from_pairs(pairs: Vec<(String, u64)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(id, start_block)| DescriptorSource { id, start_block })
                .collect(),
        )
    }

    /// Select the most recent source valid at `block`
    ///
    /// Scans from the end of the list backward and returns the first
    /// source whose threshold is at or below the query block; `None` when
    /// no source qualifies yet.
    pub fn select(&self, block: u64) -> Option<&str> {
        self.sources
            .iter()
            .rev()
            .find(|s| s.start_block <= block)
            .map(|s| s.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// External artwork renderer
#[async_trait]
pub trait ArtworkRenderer: Send + Sync {
    /// Render artwork markup for a seed using the given source
    async fn render(&self, source_id: &str, seed: &NounSeed) -> Result<String>;
}

/// HTTP-backed renderer
pub struct HttpRenderer {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent("gazette/1.0")
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl ArtworkRenderer for HttpRenderer {
    async fn render(&self, source_id: &str, seed: &NounSeed) -> Result<String> {
        let url = format!("{}/v1/render/{}", self.base_url.trim_end_matches('/'), source_id);
        debug!(source = %source_id, url = %url, "rendering artwork");

        let response = self
            .http_client
            .post(&url)
            .json(seed)
            .send()
            .await
            .map_err(|e| GazetteError::Renderer(format!("render request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GazetteError::Renderer(format!(
                "renderer returned HTTP {} for source {}",
                response.status(),
                source_id
            )));
        }

        response
            .text()
            .await
            .map_err(|e| GazetteError::Renderer(format!("render response read failed: {e}")))
    }
}

/// External trait-metrics calculator; pure and deterministic
pub trait TraitMetrics: Send + Sync {
    fn compute(&self, seed: &NounSeed) -> NounMetrics;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DescriptorRegistry {
        DescriptorRegistry::from_pairs(vec![
            ("descriptor-v1".to_string(), 100),
            ("descriptor-v2".to_string(), 500),
            ("descriptor-v3".to_string(), 900),
        ])
    }

    #[test]
    fn test_select_returns_largest_threshold_at_or_below_block() {
        let registry = registry();
        assert_eq!(registry.select(100), Some("descriptor-v1"));
        assert_eq!(registry.select(499), Some("descriptor-v1"));
        assert_eq!(registry.select(500), Some("descriptor-v2"));
        assert_eq!(registry.select(1_000_000), Some("descriptor-v3"));
    }

    #[test]
    fn test_select_before_first_threshold_is_none() {
        assert_eq!(registry().select(99), None);
        assert_eq!(DescriptorRegistry::default().select(1_000), None);
    }

    #[test]
    fn test_sources_sorted_on_construction() {
        let registry = DescriptorRegistry::from_pairs(vec![
            ("late".to_string(), 900),
            ("early".to_string(), 10),
        ]);
        assert_eq!(registry.select(10), Some("early"));
        assert_eq!(registry.select(901), Some("late"));
    }
}
