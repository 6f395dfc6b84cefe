//! Bounded retry queue for deferred persistence.
//!
//! Ring buffer of persistence ops with drop-oldest overflow, age-based
//! expiry on drain, and an auto-flush task. Shutdown drains before the
//! timer stops so no pending op is silently lost.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::ops::PersistOp;
use crate::session::MemorySession;

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct RetryQueueConfig {
    pub capacity: usize,
    pub max_age: Duration,
    pub flush_interval: Duration,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_age: Duration::from_secs(300),
            flush_interval: Duration::from_secs(5),
        }
    }
}

struct Entry {
    op: PersistOp,
    enqueued_at: Instant,
}

struct Inner {
    entries: VecDeque<Entry>,
    dropped: u64,
    expired: u64,
}

/// What one flush pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub applied: usize,
    pub requeued: usize,
    pub expired: usize,
}

/// Bounded drop-oldest retry queue.
pub struct RetryQueue {
    config: RetryQueueConfig,
    inner: Mutex<Inner>,
}

impl RetryQueue {
    pub fn new(config: RetryQueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                dropped: 0,
                expired: 0,
            }),
        }
    }

    /// Append an op, evicting the oldest entry when over capacity.
    pub fn enqueue(&self, op: PersistOp) {
        let mut inner = self.inner.lock();
        inner.entries.push_back(Entry {
            op,
            enqueued_at: Instant::now(),
        });
        while inner.entries.len() > self.config.capacity {
            inner.entries.pop_front();
            inner.dropped += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ops evicted by the capacity bound since construction.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// Ops discarded by age expiry since construction.
    pub fn expired(&self) -> u64 {
        self.inner.lock().expired
    }

    /// Remove and return entries young enough to retry; discard the rest.
    pub fn drain_valid(&self, now: Instant) -> Vec<PersistOp> {
        let mut inner = self.inner.lock();
        let mut valid = Vec::new();
        let mut expired = 0u64;
        for entry in inner.entries.drain(..) {
            if now.duration_since(entry.enqueued_at) <= self.config.max_age {
                valid.push(entry.op);
            } else {
                expired += 1;
            }
        }
        if expired > 0 {
            inner.expired += expired;
            tracing::warn!(expired, "retry queue dropped aged-out ops");
        }
        valid
    }

    /// Drain and apply against the session. A failed apply re-enqueues the
    /// failed op and everything after it at the tail.
    pub async fn flush(&self, session: &dyn MemorySession) -> FlushOutcome {
        let before_expired = self.expired();
        let batch = self.drain_valid(Instant::now());
        let expired = (self.expired() - before_expired) as usize;

        let mut outcome = FlushOutcome {
            expired,
            ..FlushOutcome::default()
        };
        let mut failed_at = None;
        for (idx, op) in batch.iter().enumerate() {
            if let Err(err) = session.apply(op).await {
                tracing::warn!(error = %err, "memory apply failed, re-enqueueing tail");
                failed_at = Some(idx);
                break;
            }
            outcome.applied += 1;
        }
        if let Some(idx) = failed_at {
            for op in batch.into_iter().skip(idx) {
                self.enqueue(op);
                outcome.requeued += 1;
            }
        }
        outcome
    }

    /// Spawn the auto-flush task.
    pub fn start(queue: Arc<Self>, session: Arc<dyn MemorySession>) -> AutoFlush {
        let shutdown = Arc::new(Notify::new());
        let task_shutdown = shutdown.clone();
        let task_queue = queue.clone();
        let interval = queue.config.flush_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_shutdown.notified() => break,
                    _ = ticker.tick() => {
                        if !task_queue.is_empty() {
                            task_queue.flush(session.as_ref()).await;
                        }
                    }
                }
            }
        });
        AutoFlush {
            queue,
            shutdown,
            handle,
        }
    }
}

/// Handle to a running auto-flush task.
pub struct AutoFlush {
    queue: Arc<RetryQueue>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl AutoFlush {
    /// Stop the timer, then flush once more so nothing pending is dropped.
    pub async fn drain_and_stop(self, session: &dyn MemorySession) -> FlushOutcome {
        self.shutdown.notify_one();
        let _ = self.handle.await;
        self.queue.flush(session).await
    }
}
