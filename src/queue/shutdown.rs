//! Drain-and-stop coordination.

use super::QueueShared;
use crate::executor::BlockingPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// What [`TaskQueue::shutdown`](crate::TaskQueue::shutdown) observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every accepted task ran before the dispatch loop stopped.
    pub drained: bool,
    /// The drain wait gave up after its budget.
    pub timed_out: bool,
    /// Tasks still queued when the wait ended; abandoned if `timed_out`.
    pub pending: usize,
    /// Tasks still executing when the wait ended.
    pub active: usize,
    pub elapsed: Duration,
}

/// Polls until nothing is pending or active. Returns `false` if `timeout`
/// ran out first.
pub(crate) async fn wait_for_drain(shared: &QueueShared, timeout: Duration) -> bool {
    let started = Instant::now();

    while !shared.is_idle() {
        tokio::time::sleep(shared.config.drain_poll_interval).await;

        if started.elapsed() > timeout {
            tracing::warn!(
                pending = shared.pending(),
                active = shared.active(),
                timeout_ms = timeout.as_millis() as u64,
                "shutdown drain timed out, abandoning remaining tasks"
            );
            return false;
        }
    }

    true
}

/// Cancels the dispatch loop if it is still running and waits for it.
pub(crate) async fn stop_dispatch(handle: JoinHandle<()>) {
    if !handle.is_finished() {
        handle.abort();
    }

    match handle.await {
        Ok(()) => tracing::debug!("dispatch loop exited"),
        Err(e) if e.is_cancelled() => tracing::debug!("dispatch loop cancelled"),
        Err(e) => tracing::error!(error = %e, "dispatch loop panicked"),
    }
}

/// Joins the blocking workers without stalling the runtime. In-flight jobs
/// always run to completion, whatever the drain budget was.
pub(crate) async fn stop_pool(pool: Arc<BlockingPool>) {
    let joined = tokio::task::spawn_blocking(move || pool.shutdown()).await;

    if let Err(e) = joined {
        tracing::error!(error = %e, "blocking pool shutdown failed");
    }
}
