//! The task queue: submission bridge, dispatch loop and shutdown.
//!
//! Submissions may come from any thread. They cross into the dispatch loop
//! through an unbounded channel (the bridge); nothing outside the loop
//! touches the queue's contents. The loop runs on a tokio runtime captured
//! at [`TaskQueue::start`], executes one task at a time in acceptance
//! order, and offloads `Blocking` tasks to a fixed [`BlockingPool`].
//!
//! Lifecycle: `Idle → Running → Draining → Stopped`.

mod dispatch;
pub mod shutdown;
pub mod task;

pub use shutdown::ShutdownReport;
pub use task::{BlockingFn, BoxFuture, Callable, TaskDescriptor, TaskId, TaskKind};

use crate::config::QueueConfig;
use crate::error::{Error, Result, TaskResult};
use crate::executor::{BlockingPool, PanicHandler};
use crate::telemetry::{MetricsSnapshot, QueueMetrics};
use async_channel::Sender;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    /// Constructed, not accepting.
    Idle,
    Running,
    /// Shutdown requested; finishing accepted work.
    Draining,
    Stopped,
}

/// Counters and settings shared between the handle, the bridge and the loop.
pub(crate) struct QueueShared {
    pub(crate) config: QueueConfig,
    pub(crate) pending: AtomicUsize,
    pub(crate) active: AtomicUsize,
    pub(crate) shutdown_requested: AtomicBool,
    pub(crate) metrics: QueueMetrics,
    // cooperative path only; blocking panics are handled inside the pool
    pub(crate) panic_handler: PanicHandler,
}

impl QueueShared {
    pub(crate) fn new(config: QueueConfig) -> Self {
        let panic_handler = PanicHandler::new(config.panic_strategy);
        Self {
            config,
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            shutdown_requested: AtomicBool::new(false),
            metrics: QueueMetrics::new(),
            panic_handler,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn is_idle(&self) -> bool {
        // pending first: the loop raises active before lowering pending
        self.pending() == 0 && self.active() == 0
    }
}

struct QueueState {
    phase: QueuePhase,
    bridge: Option<Sender<TaskDescriptor>>,
    dispatch: Option<JoinHandle<()>>,
    pool: Option<Arc<BlockingPool>>,
}

/// Handle to an in-process task queue.
///
/// Cloning is cheap and every clone refers to the same queue, so one
/// instance built at startup can be handed to every component that submits
/// work. Dropping the last handle without calling
/// [`shutdown`](Self::shutdown) closes the bridge; the loop then finishes
/// what was accepted and exits on its own.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
    state: Arc<RwLock<QueueState>>,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(QueueShared::new(config)),
            state: Arc::new(RwLock::new(QueueState {
                phase: QueuePhase::Idle,
                bridge: None,
                dispatch: None,
                pool: None,
            })),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(QueueConfig::default())
    }

    /// Start the dispatch loop on the current tokio runtime.
    ///
    /// A no-op if the loop is already running. Fails with
    /// [`Error::NoRuntime`] outside a runtime and with
    /// [`Error::QueueClosed`] once shutdown has begun.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        self.start_on(&handle)
    }

    /// Start the dispatch loop on an explicit runtime.
    ///
    /// The runtime must have its time driver enabled.
    pub fn start_on(&self, handle: &Handle) -> Result<()> {
        let mut state = self.state.write();

        match state.phase {
            QueuePhase::Draining | QueuePhase::Stopped => return Err(Error::QueueClosed),
            QueuePhase::Running => {
                if state.dispatch.as_ref().is_some_and(|h| !h.is_finished()) {
                    return Ok(());
                }
                // the hosting runtime went away or the loop died; anything
                // left in the old bridge went with it
                let lost = self.shared.pending.swap(0, Ordering::SeqCst);
                tracing::warn!(lost, "dispatch loop is gone, starting a new one");
            }
            QueuePhase::Idle => {}
        }

        let pool = match &state.pool {
            Some(pool) => pool.clone(),
            None => {
                let pool = Arc::new(BlockingPool::new(&self.shared.config)?);
                state.pool = Some(pool.clone());
                pool
            }
        };

        let (bridge, receiver) = async_channel::unbounded();
        let dispatch = handle.spawn(dispatch::dispatch_loop(self.shared.clone(), pool, receiver));

        state.bridge = Some(bridge);
        state.dispatch = Some(dispatch);
        state.phase = QueuePhase::Running;

        tracing::info!(
            worker_threads = self.shared.config.worker_threads,
            idle_poll_ms = self.shared.config.idle_poll_interval.as_millis() as u64,
            "task queue started"
        );
        Ok(())
    }

    /// Accept a task for execution. Never waits for the task to run.
    ///
    /// Callable from any thread, with or without a tokio context.
    pub fn submit(&self, mut task: TaskDescriptor) -> Result<TaskId> {
        let state = self.state.read();

        if self.shared.shutdown_requested.load(Ordering::SeqCst) {
            return Err(self.reject(&task, Error::QueueClosed));
        }
        let Some(bridge) = state.bridge.as_ref() else {
            return Err(self.reject(&task, Error::QueueNotStarted));
        };

        let id = task.id;
        task.submitted_at = Instant::now();

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = bridge.try_send(task) {
            // receiver dropped: the loop is gone
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(self.reject(&err.into_inner(), Error::QueueClosed));
        }

        self.shared.metrics.record_submitted();
        tracing::debug!(task_id = %id, "task accepted");
        Ok(id)
    }

    /// Submit a closure that runs on a blocking-pool thread.
    pub fn submit_blocking<F, A>(&self, name: impl Into<Cow<'static, str>>, f: F, args: A) -> Result<TaskId>
    where
        F: FnOnce(A) -> TaskResult + Send + 'static,
        A: fmt::Debug + Send + 'static,
    {
        self.submit(TaskDescriptor::blocking(name, f, args))
    }

    /// Submit an async function that is awaited on the dispatch loop.
    pub fn submit_cooperative<F, Fut, A>(
        &self,
        name: impl Into<Cow<'static, str>>,
        f: F,
        args: A,
    ) -> Result<TaskId>
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
        A: fmt::Debug + Send + 'static,
    {
        self.submit(TaskDescriptor::cooperative(name, f, args))
    }

    /// Graceful shutdown with the configured drain budget.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with_timeout(self.shared.config.shutdown_timeout).await
    }

    /// Stop accepting, wait up to `timeout` for accepted work to finish,
    /// then stop the loop and the blocking pool.
    ///
    /// Never fails. A timed-out drain is logged and reported; the task
    /// running at that moment is cancelled if cooperative, and allowed to
    /// finish if it is already on a blocking thread.
    ///
    /// Called from a cooperative task (that is, from the dispatch loop
    /// itself) it only closes the queue and returns at once: the loop runs
    /// the remaining backlog and exits, and a later `shutdown` from outside
    /// the queue waits for it and stops the pool.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> ShutdownReport {
        let started = Instant::now();

        let (dispatch, pool) = {
            let mut state = self.state.write();
            self.shared.shutdown_requested.store(true, Ordering::SeqCst);
            if let Some(bridge) = state.bridge.take() {
                bridge.close();
            }
            if state.phase != QueuePhase::Stopped {
                state.phase = QueuePhase::Draining;
            }

            let on_loop = state
                .dispatch
                .as_ref()
                .is_some_and(|h| tokio::task::try_id() == Some(h.id()));
            if on_loop {
                // waiting here would wait on ourselves
                tracing::error!(
                    pending = self.shared.pending(),
                    "shutdown called from inside a queued task, closing without draining"
                );
                return ShutdownReport {
                    drained: false,
                    timed_out: false,
                    pending: self.shared.pending(),
                    active: self.shared.active(),
                    elapsed: started.elapsed(),
                };
            }

            (state.dispatch.take(), state.pool.take())
        };

        tracing::info!(
            pending = self.shared.pending(),
            active = self.shared.active(),
            "draining task queue"
        );

        let drained = shutdown::wait_for_drain(&self.shared, timeout).await;
        let pending = self.shared.pending();
        let active = self.shared.active();

        if let Some(dispatch) = dispatch {
            shutdown::stop_dispatch(dispatch).await;
        }
        // the aborted loop dropped its receiver, and with it the backlog
        self.shared.pending.store(0, Ordering::SeqCst);

        if let Some(pool) = pool {
            shutdown::stop_pool(pool).await;
        }

        self.state.write().phase = QueuePhase::Stopped;

        let report = ShutdownReport {
            drained,
            timed_out: !drained,
            pending,
            active,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            drained,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "task queue stopped"
        );
        report
    }

    pub fn phase(&self) -> QueuePhase {
        self.state.read().phase
    }

    /// True while `submit` would accept a task.
    pub fn is_accepting(&self) -> bool {
        !self.shared.shutdown_requested.load(Ordering::SeqCst) && self.state.read().bridge.is_some()
    }

    /// Tasks accepted but not yet picked up by the loop.
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    /// Tasks currently executing (0 or 1).
    pub fn active(&self) -> usize {
        self.shared.active()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    fn reject(&self, task: &TaskDescriptor, err: Error) -> Error {
        self.shared.metrics.record_rejected();
        tracing::debug!(task = %task.name, error = %err, "task rejected");
        err
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("phase", &self.phase())
            .field("pending", &self.pending())
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> QueueConfig {
        QueueConfig::builder()
            .worker_threads(2)
            .idle_poll_interval(Duration::from_millis(10))
            .drain_poll_interval(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = QueueConfig::default();
        config.worker_threads = 0;
        assert!(matches!(TaskQueue::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_start_outside_runtime() {
        let queue = TaskQueue::new(quick_config()).unwrap();
        assert!(matches!(queue.start(), Err(Error::NoRuntime)));
        assert_eq!(queue.phase(), QueuePhase::Idle);
    }

    #[test]
    fn test_submit_before_start() {
        let queue = TaskQueue::new(quick_config()).unwrap();

        let result = queue.submit_blocking("noop", |_: ()| Ok(()), ());

        assert!(matches!(result, Err(Error::QueueNotStarted)));
        assert!(!queue.is_accepting());
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.metrics().tasks_rejected, 1);
    }

    #[test]
    fn test_start_on_explicit_handle() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let queue = TaskQueue::new(quick_config()).unwrap();

        queue.start_on(rt.handle()).unwrap();
        assert_eq!(queue.phase(), QueuePhase::Running);
        assert!(queue.is_accepting());

        let report = rt.block_on(queue.shutdown());
        assert!(report.drained);
        assert_eq!(queue.phase(), QueuePhase::Stopped);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let queue = TaskQueue::new(quick_config()).unwrap();

        queue.start().unwrap();
        queue.start().unwrap();
        assert_eq!(queue.phase(), QueuePhase::Running);

        queue.submit_blocking("noop", |_: ()| Ok(()), ()).unwrap();
        let report = queue.shutdown().await;

        assert!(report.drained);
        assert_eq!(queue.metrics().tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_submit_and_start_after_shutdown() {
        let queue = TaskQueue::new(quick_config()).unwrap();
        queue.start().unwrap();
        queue.shutdown().await;

        let result = queue.submit_cooperative("late", |_: ()| async { Ok(()) }, ());
        assert!(matches!(result, Err(Error::QueueClosed)));
        assert!(matches!(queue.start(), Err(Error::QueueClosed)));
        assert_eq!(queue.phase(), QueuePhase::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let queue = TaskQueue::new(quick_config()).unwrap();

        let report = queue.shutdown().await;

        assert!(report.drained);
        assert!(!report.timed_out);
        assert_eq!(queue.phase(), QueuePhase::Stopped);
        assert!(matches!(
            queue.submit_blocking("noop", |_: ()| Ok(()), ()),
            Err(Error::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_twice() {
        let queue = TaskQueue::new(quick_config()).unwrap();
        queue.start().unwrap();

        assert!(queue.shutdown().await.drained);
        let second = queue.shutdown().await;
        assert!(second.drained);
        assert_eq!(queue.phase(), QueuePhase::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_from_inside_a_task_returns() {
        let queue = TaskQueue::new(quick_config()).unwrap();
        queue.start().unwrap();

        let inner = queue.clone();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = seen.clone();
        queue
            .submit_cooperative(
                "self_stop",
                move |_: ()| async move {
                    let report = inner.shutdown_with_timeout(Duration::from_secs(30)).await;
                    *slot.lock() = Some(report);
                    Ok(())
                },
                (),
            )
            .unwrap();

        let behind = Arc::new(AtomicBool::new(false));
        let flag = behind.clone();
        queue
            .submit_blocking(
                "behind_self_stop",
                move |_: ()| {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                (),
            )
            .unwrap();

        let started = Instant::now();
        let inner_report = loop {
            if let Some(report) = *seen.lock() {
                break report;
            }
            assert!(started.elapsed() < Duration::from_secs(5));
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        assert!(!inner_report.drained);
        assert!(!inner_report.timed_out);
        assert_eq!(inner_report.active, 1);
        assert!(matches!(
            queue.submit_blocking("late", |_: ()| Ok(()), ()),
            Err(Error::QueueClosed)
        ));

        let report = queue.shutdown().await;
        assert!(report.drained);
        assert!(behind.load(Ordering::SeqCst));
        assert_eq!(queue.phase(), QueuePhase::Stopped);
        assert_eq!(queue.metrics().tasks_completed, 2);
    }

    #[test]
    fn test_restart_after_runtime_went_away() {
        let queue = TaskQueue::new(quick_config()).unwrap();

        {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            queue.start_on(rt.handle()).unwrap();
        }
        // the first runtime dropped the loop along with itself

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        queue.start_on(rt.handle()).unwrap();
        assert_eq!(queue.phase(), QueuePhase::Running);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        queue
            .submit_cooperative(
                "after_restart",
                move |_: ()| async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                (),
            )
            .unwrap();

        let report = rt.block_on(queue.shutdown());
        assert!(report.drained);
        assert!(ran.load(Ordering::SeqCst));
    }
}
