//! The dispatch loop: pops tasks one at a time and runs them to an end.

use super::task::{BlockingFn, BoxFuture, Callable, TaskDescriptor};
use super::QueueShared;
use crate::error::{TaskError, TaskResult};
use crate::executor::{BlockingPool, PanicHandler};
use async_channel::{Receiver, TryRecvError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Holds one unit of `active_count` for as long as a task is in hand.
///
/// Dropping it (normally, by unwinding, or because the loop was aborted
/// mid-task) gives the unit back.
struct ActiveGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) async fn dispatch_loop(
    shared: Arc<QueueShared>,
    pool: Arc<BlockingPool>,
    bridge: Receiver<TaskDescriptor>,
) {
    tracing::debug!("dispatch loop started");

    while let Some(task) = next_task(&shared, &bridge).await {
        // active goes up before pending goes down so the drain check
        // never sees both at zero while a task is in hand
        let active = ActiveGuard::enter(&shared.active);
        shared.pending.fetch_sub(1, Ordering::SeqCst);

        run_task(&shared, &pool, task, active).await;
    }

    tracing::debug!("dispatch loop finished, bridge closed and empty");
}

/// Non-blocking pop first; on an empty queue wait at most one idle interval.
/// `None` once the bridge is closed and drained.
async fn next_task(shared: &QueueShared, bridge: &Receiver<TaskDescriptor>) -> Option<TaskDescriptor> {
    loop {
        match bridge.try_recv() {
            Ok(task) => return Some(task),
            Err(TryRecvError::Closed) => return None,
            Err(TryRecvError::Empty) => {}
        }

        match tokio::time::timeout(shared.config.idle_poll_interval, bridge.recv()).await {
            Ok(Ok(task)) => return Some(task),
            Ok(Err(_)) => return None,
            Err(_) => tracing::trace!("task queue idle"),
        }
    }
}

async fn run_task(shared: &QueueShared, pool: &BlockingPool, task: TaskDescriptor, active: ActiveGuard<'_>) {
    let TaskDescriptor {
        id,
        name,
        callable,
        args,
        submitted_at,
    } = task;
    let kind = callable.kind();
    let waited = submitted_at.elapsed();

    tracing::info!(task_id = %id, task = %name, ?kind, args = %args, "task started");

    let started = Instant::now();
    let outcome = match callable {
        Callable::Cooperative(fut) => run_cooperative(&shared.panic_handler, fut).await,
        Callable::Blocking(f) => run_blocking(pool, f).await,
    };
    let ran = started.elapsed();
    drop(active);

    shared.metrics.record_outcome(waited, ran, &outcome);

    let elapsed_ms = ran.as_millis() as u64;
    match &outcome {
        Ok(()) => {
            tracing::info!(task_id = %id, task = %name, args = %args, elapsed_ms, "task finished");
        }
        Err(err) => {
            tracing::error!(
                task_id = %id,
                task = %name,
                args = %args,
                elapsed_ms,
                error = %err,
                "task failed"
            );
        }
    }
}

async fn run_cooperative(handler: &PanicHandler, fut: BoxFuture) -> TaskResult {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(TaskError::Panicked(handler.on_panic(payload).message)),
    }
}

/// Hands the closure to the pool and suspends until a worker reports back.
async fn run_blocking(pool: &BlockingPool, f: BlockingFn) -> TaskResult {
    let receiver = pool.spawn(f)?;

    match receiver.recv().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(panic)) => Err(TaskError::Panicked(panic.message)),
        Err(_) => Err(TaskError::failed("blocking worker dropped the task")),
    }
}
