//! Telemetry stream consumer.
//!
//! Long-running consumer of the simulation's newline-delimited JSON
//! telemetry stream. Drops of the connection reconnect after a fixed delay;
//! cancellation is cooperative through the returned handle.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::types::{TelemetryFilter, TelemetryItem};

/// Delay before reconnecting a dropped stream.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Handle to a running telemetry subscription.
pub struct TelemetrySubscription {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl TelemetrySubscription {
    /// Stop the consumer and wait for it to wind down.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        let _ = self.handle.await;
    }
}

/// Subscribe to the telemetry stream, delivering items on `tx`.
///
/// The consumer runs until the handle is stopped or the receiving side of
/// `tx` is dropped.
pub fn subscribe(
    base_url: String,
    filter: TelemetryFilter,
    tx: mpsc::Sender<TelemetryItem>,
) -> TelemetrySubscription {
    let shutdown = Arc::new(Notify::new());
    let task_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        let client = reqwest::Client::new();
        loop {
            tokio::select! {
                _ = task_shutdown.notified() => break,
                done = consume_once(&client, &base_url, &filter, &tx) => {
                    if done {
                        break;
                    }
                    tracing::info!(delay_s = RECONNECT_DELAY.as_secs(), "telemetry stream ended, reconnecting");
                    tokio::select! {
                        _ = task_shutdown.notified() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    });
    TelemetrySubscription { shutdown, handle }
}

/// Consume one connection until it ends. Returns true when the receiver is
/// gone and the subscription should stop for good.
async fn consume_once(
    client: &reqwest::Client,
    base_url: &str,
    filter: &TelemetryFilter,
    tx: &mpsc::Sender<TelemetryItem>,
) -> bool {
    let request = client
        .get(format!("{base_url}/telemetry/stream"))
        .query(&[
            ("includeMentalBreakdowns", filter.include_mental_breakdowns),
            ("includePermanentTraumas", filter.include_permanent_traumas),
            ("includeStateChanges", filter.include_state_changes),
        ])
        .send();

    let response = match request.await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            tracing::warn!(status = %r.status(), "telemetry stream rejected");
            return false;
        }
        Err(e) => {
            tracing::warn!(error = %e, "telemetry stream connect failed");
            return false;
        }
    };

    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "telemetry stream read failed");
                return false;
            }
        };
        buffer.extend_from_slice(&chunk);
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryItem>(line) {
                Ok(item) => {
                    if tx.send(item).await.is_err() {
                        return true;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed telemetry line");
                }
            }
        }
    }
    false
}
