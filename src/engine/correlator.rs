use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::common::errors::{EngineError, EngineResult};
use crate::database::schema::job::JobId;

type TerminalPayload = Map<String, Value>;

struct PendingWaiter {
    tx: oneshot::Sender<EngineResult<TerminalPayload>>,
    registered_at: Instant,
}

/// Completion handle returned by `register_waiter`; consumed by `wait`.
pub struct WaiterHandle {
    job_id: JobId,
    rx: oneshot::Receiver<EngineResult<TerminalPayload>>,
}

/// Bridges the asynchronous response path to an optional synchronous wait.
/// A caller registers interest before triggering dispatch; the dispatch path
/// resolves the registration when the job reaches a terminal state.
#[derive(Default)]
pub struct ResponseCorrelator {
    waiters: DashMap<JobId, PendingWaiter>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the completion handle for a job. Registering again for a
    /// still-pending job replaces the earlier registration; the superseded
    /// waiter observes a closed channel.
    pub fn register_waiter(&self, job_id: JobId) -> WaiterHandle {
        let (tx, rx) = oneshot::channel();
        let previous = self.waiters.insert(
            job_id,
            PendingWaiter {
                tx,
                registered_at: Instant::now(),
            },
        );
        if previous.is_some() {
            warn!("Replaced existing waiter for job {}", job_id);
        }
        debug!("Registered waiter for job {}", job_id);
        WaiterHandle { job_id, rx }
    }

    /// Complete and remove the waiter for a job. A response with nobody
    /// waiting is normal traffic for fire-and-forget callers, so it only
    /// logs.
    pub fn resolve(&self, job_id: JobId, payload: TerminalPayload) {
        match self.waiters.remove(&job_id) {
            Some((_, waiter)) => {
                if waiter.tx.send(Ok(payload)).is_err() {
                    debug!("Waiter for job {} was abandoned before resolution", job_id);
                } else {
                    debug!(
                        "Resolved waiter for job {} after {:?}",
                        job_id,
                        waiter.registered_at.elapsed()
                    );
                }
            }
            None => {
                info!("No waiter registered for job {}", job_id);
            }
        }
    }

    /// Fail and remove the waiter for a job that can never reach a terminal
    /// payload, so the caller returns immediately instead of waiting out its
    /// deadline.
    pub fn fail(&self, job_id: JobId, error: EngineError) {
        if let Some((_, waiter)) = self.waiters.remove(&job_id) {
            warn!("Failing waiter for job {}: {}", job_id, error);
            let _ = waiter.tx.send(Err(error));
        }
    }

    /// Block the calling task (never the consumer loops) until the waiter is
    /// resolved or the deadline passes. On timeout the orphaned registration
    /// is removed and the caller is expected to fall back to status polling.
    pub async fn wait(&self, handle: WaiterHandle, timeout: Duration) -> EngineResult<TerminalPayload> {
        let job_id = handle.job_id;
        match tokio::time::timeout(timeout, handle.rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without resolving: this registration was
            // superseded or swept.
            Ok(Err(_)) => Err(EngineError::TimedOut),
            Err(_) => {
                warn!("Timeout waiting for response for job {}", job_id);
                // Only remove the entry if it is still ours; a newer
                // registration for the same job must survive.
                self.waiters.remove_if(&job_id, |_, waiter| waiter.tx.is_closed());
                Err(EngineError::TimedOut)
            }
        }
    }

    /// Drop a registration made by the calling context, e.g. when the job
    /// turned out to be unknown before any wait began.
    pub fn forget(&self, job_id: JobId) {
        self.waiters.remove(&job_id);
    }

    /// Remove entries whose receiver side is gone. A best-effort leak guard
    /// for callers that registered and never collected, not a correctness
    /// mechanism.
    pub fn sweep(&self) -> usize {
        let before = self.waiters.len();
        self.waiters.retain(|_, waiter| !waiter.tx.is_closed());
        before - self.waiters.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let correlator = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = correlator.sweep();
                if removed > 0 {
                    info!("Cleaned up {} abandoned waiters", removed);
                }
            }
        })
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.waiters.len()
    }
}
