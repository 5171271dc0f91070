//! Event feed decoding
//!
//! The shipped binary reads decoded events as NDJSON, one envelope per
//! line. The feed layer owns malformed-input rejection: a line that fails
//! to decode is logged and skipped before it can reach the Reconciler.
//! Subscription management, head tracking, and reorg detection live
//! upstream of this boundary.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::EventEnvelope;
use crate::types::{GazetteError, Result};

/// Read envelopes from an NDJSON reader into the pipeline channel
///
/// Returns the count of decoded envelopes once the reader is exhausted.
pub async fn pump<R>(reader: R, tx: mpsc::Sender<EventEnvelope>) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut decoded: u64 = 0;
    let mut rejected: u64 = 0;

    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| GazetteError::Feed(format!("feed read failed: {e}")))?;
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let envelope: EventEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                rejected += 1;
                warn!("rejecting malformed event line: {}", e);
                continue;
            }
        };

        decoded += 1;
        if tx.send(envelope).await.is_err() {
            return Err(GazetteError::Feed("pipeline closed mid-stream".to_string()));
        }
    }

    debug!(decoded, rejected, "feed exhausted");
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChainEvent;

    #[tokio::test]
    async fn test_pump_decodes_and_skips_malformed() {
        let input = concat!(
            r#"{"tx_hash":"0xa","log_index":0,"block_number":1,"block_timestamp":2,"tx_sender":"0xs","event":{"type":"proposal_executed","args":{"id":7}}}"#,
            "\n",
            "this is not json\n",
            "\n",
            r#"{"tx_hash":"0xb","log_index":1,"block_number":1,"block_timestamp":2,"tx_sender":"0xs","event":{"type":"proposal_vetoed","args":{"id":8}}}"#,
            "\n",
        );

        let (tx, mut rx) = mpsc::channel(8);
        let decoded = pump(input.as_bytes(), tx).await.unwrap();
        assert_eq!(decoded, 2);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, ChainEvent::ProposalExecuted { id: 7 }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, ChainEvent::ProposalVetoed { id: 8 }));
        assert!(rx.recv().await.is_none());
    }
}
