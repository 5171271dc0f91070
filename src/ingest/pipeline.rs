//! Ingestion pipeline
//!
//! Fans the event stream out over a fixed set of worker lanes. Events of
//! one transaction always land in the same lane (hash partition on the
//! transaction hash), so same-transaction events are applied in arrival
//! order while unrelated transactions proceed concurrently. A handler
//! error is logged and isolated to its event; the stream runs to
//! exhaustion of the input.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::events::EventEnvelope;
use crate::ingest::Reconciler;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker lanes
    pub worker_count: usize,
    /// Queued events per lane before backpressure
    pub lane_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            lane_capacity: 256,
        }
    }
}

/// Counters reported when the pipeline drains
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub processed: u64,
    pub failed: u64,
}

/// Concurrent reconciliation pipeline
pub struct Pipeline {
    reconciler: Arc<Reconciler>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(reconciler: Arc<Reconciler>, config: PipelineConfig) -> Self {
        Self { reconciler, config }
    }

    /// Consume the event stream to exhaustion
    ///
    /// Returns once every lane has drained.
    pub async fn run(&self, mut events: mpsc::Receiver<EventEnvelope>) -> PipelineStats {
        let worker_count = self.config.worker_count.max(1);
        let processed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        let mut senders = Vec::with_capacity(worker_count);
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(worker_count);

        for lane in 0..worker_count {
            let (tx, mut rx) = mpsc::channel::<EventEnvelope>(self.config.lane_capacity);
            senders.push(tx);

            let reconciler = self.reconciler.clone();
            let processed = processed.clone();
            let failed = failed.clone();
            workers.push(tokio::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    match reconciler.apply(&envelope).await {
                        Ok(()) => {
                            processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            // Failure is isolated to this event
                            failed.fetch_add(1, Ordering::Relaxed);
                            error!(
                                lane,
                                event = envelope.event.name(),
                                tx = %envelope.tx_hash,
                                log_index = envelope.log_index,
                                "event failed: {}",
                                e
                            );
                        }
                    }
                }
                debug!(lane, "lane drained");
            }));
        }

        while let Some(envelope) = events.recv().await {
            let lane = lane_for(&envelope.tx_hash, worker_count);
            if senders[lane].send(envelope).await.is_err() {
                error!(lane, "lane closed unexpectedly, dropping event");
            }
        }

        // Close the lanes and wait for them to drain
        drop(senders);
        for worker in workers {
            let _ = worker.await;
        }

        let stats = PipelineStats {
            processed: processed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        info!(
            processed = stats.processed,
            failed = stats.failed,
            "pipeline drained"
        );
        stats
    }
}

/// Stable lane assignment for a transaction hash
fn lane_for(tx_hash: &str, worker_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    tx_hash.hash(&mut hasher);
    (hasher.finish() % worker_count as u64) as usize
}
