use super::job::Job;
use super::panic_handler::{PanicHandler, PanicInfo};
use super::worker::{Worker, WorkerId, WorkerState};
use crate::config::QueueConfig;
use crate::error::{Error, Result, TaskError};
use crossbeam_deque::Injector;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Completion channel handed back by [`BlockingPool::spawn`].
pub type JobReceiver<R> = async_channel::Receiver<std::result::Result<R, PanicInfo>>;

/// Fixed-size pool of OS threads for work that cannot yield.
///
/// Jobs are taken in FIFO order from a shared injector. [`shutdown`](Self::shutdown)
/// stops admission, lets the workers finish everything already queued, and
/// joins them.
pub struct BlockingPool {
    workers: Mutex<Vec<WorkerHandle>>,
    unparkers: Vec<thread::Thread>,
    states: Vec<Arc<WorkerState>>,
    injector: Arc<Injector<Job>>,
    // admission gate: submitters hold it shared, shutdown takes it exclusively
    closed: RwLock<bool>,
    shutdown: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    next_wake: AtomicUsize,
    num_threads: usize,
    panic_handler: Arc<PanicHandler>,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
}

impl BlockingPool {
    pub fn new(config: &QueueConfig) -> Result<Self> {
        let num_threads = config.worker_threads;
        if num_threads == 0 {
            return Err(Error::config("need at least 1 worker thread"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(num_threads);
        let mut unparkers = Vec::with_capacity(num_threads);
        let mut states = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let worker = Worker::new(id);
            states.push(worker.state.clone());

            let injector_clone = injector.clone();
            let shutdown_clone = shutdown.clone();
            let queued_clone = queued.clone();
            let name = format!("{}-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let spawned = builder.spawn(move || {
                worker.run(injector_clone, shutdown_clone, queued_clone);
            });

            let thread = match spawned {
                Ok(thread) => thread,
                Err(e) => {
                    // don't leak the threads that did start
                    shutdown.store(true, Ordering::Release);
                    for handle in handles.iter_mut() {
                        join_worker(handle);
                    }
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            };

            unparkers.push(thread.thread().clone());
            handles.push(WorkerHandle {
                id,
                thread: Some(thread),
            });
        }

        tracing::debug!(
            threads = num_threads,
            prefix = %config.thread_name_prefix,
            "blocking pool started"
        );

        Ok(Self {
            workers: Mutex::new(handles),
            unparkers,
            states,
            injector,
            closed: RwLock::new(false),
            shutdown,
            queued,
            next_wake: AtomicUsize::new(0),
            num_threads,
            panic_handler: Arc::new(PanicHandler::new(config.panic_strategy)),
        })
    }

    /// Queue a fire-and-forget closure.
    pub fn execute<F>(&self, f: F) -> std::result::Result<(), TaskError>
    where
        F: FnOnce() + Send + 'static,
    {
        let closed = self.closed.read();
        if *closed {
            return Err(TaskError::PoolClosed);
        }

        self.queued.fetch_add(1, Ordering::AcqRel);
        self.injector.push(Job::new(f));
        drop(closed);

        self.wake_one();
        Ok(())
    }

    /// Queue a closure and get a channel that yields its outcome once it ran.
    ///
    /// Panics inside `f` are caught on the worker and delivered as `Err`.
    pub fn spawn<F, R>(&self, f: F) -> std::result::Result<JobReceiver<R>, TaskError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = async_channel::bounded(1);
        let handler = self.panic_handler.clone();

        self.execute(move || {
            let outcome = handler.execute(f);
            let _ = sender.try_send(outcome);
        })?;

        Ok(receiver)
    }

    pub fn pending_jobs(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn jobs_executed(&self) -> u64 {
        self.states
            .iter()
            .map(|s| s.jobs_executed.load(Ordering::Relaxed))
            .sum()
    }

    /// Total time the workers spent waiting for jobs.
    pub fn idle_time(&self) -> Duration {
        let ns = self
            .states
            .iter()
            .map(|s| s.idle_time_ns.load(Ordering::Relaxed))
            .sum();
        Duration::from_nanos(ns)
    }

    pub fn panic_count(&self) -> usize {
        self.panic_handler.panic_count()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.closed.read()
    }

    /// Stop accepting jobs, run what is queued, then join every worker.
    ///
    /// Blocks the calling thread. Safe to call more than once.
    pub fn shutdown(&self) {
        *self.closed.write() = true;
        self.shutdown.store(true, Ordering::Release);

        // wake everyone up to check shutdown flag
        for unparker in &self.unparkers {
            unparker.unpark();
        }

        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            join_worker(worker);
        }
    }

    fn wake_one(&self) {
        let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % self.num_threads;
        if let Some(unparker) = self.unparkers.get(idx) {
            unparker.unpark();
        }
    }
}

fn join_worker(worker: &mut WorkerHandle) {
    if let Some(thread) = worker.thread.take() {
        if thread.join().is_err() {
            tracing::error!(worker = worker.id, "blocking worker terminated abnormally");
        }
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BlockingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingPool")
            .field("num_threads", &self.num_threads)
            .field("pending_jobs", &self.pending_jobs())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PanicStrategy;
    use parking_lot::Mutex;

    fn small_config() -> QueueConfig {
        QueueConfig::builder()
            .worker_threads(2)
            .thread_name_prefix("pool-test")
            .panic_strategy(PanicStrategy::Isolate)
            .build()
            .unwrap()
    }

    #[test]
    fn test_spawn_returns_value() {
        let pool = BlockingPool::new(&small_config()).unwrap();

        let rx = pool.spawn(|| 21 * 2).unwrap();
        let result = futures::executor::block_on(rx.recv()).unwrap();
        assert_eq!(result.unwrap(), 42);

        pool.shutdown();
    }

    #[test]
    fn test_spawn_reports_panic() {
        let pool = BlockingPool::new(&small_config()).unwrap();

        let rx = pool
            .spawn(|| {
                panic!("worker blew up");
            })
            .unwrap();
        let outcome = futures::executor::block_on(rx.recv()).unwrap();

        assert_eq!(outcome.unwrap_err().message, "worker blew up");
        assert_eq!(pool.panic_count(), 1);

        // workers survive the panic
        let rx = pool.spawn(|| "still alive").unwrap();
        assert_eq!(
            futures::executor::block_on(rx.recv()).unwrap().unwrap(),
            "still alive"
        );

        pool.shutdown();
    }

    #[test]
    fn test_runs_on_named_threads() {
        let pool = BlockingPool::new(&small_config()).unwrap();

        let rx = pool
            .spawn(|| thread::current().name().map(str::to_string))
            .unwrap();
        let name = futures::executor::block_on(rx.recv()).unwrap().unwrap();

        assert!(name.unwrap().starts_with("pool-test-"));
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_drains_queued_jobs() {
        let pool = BlockingPool::new(&small_config()).unwrap();
        let done = Arc::new(Mutex::new(Vec::new()));

        for i in 0..8 {
            let done = done.clone();
            pool.execute(move || {
                thread::sleep(Duration::from_millis(5));
                done.lock().push(i);
            })
            .unwrap();
        }

        pool.shutdown();

        let mut done = done.lock().clone();
        done.sort_unstable();
        assert_eq!(done, (0..8).collect::<Vec<_>>());
        assert_eq!(pool.pending_jobs(), 0);
        assert_eq!(pool.jobs_executed(), 8);
    }

    #[test]
    fn test_idle_time_accumulates() {
        let pool = BlockingPool::new(&small_config()).unwrap();

        thread::sleep(Duration::from_millis(50));
        let rx = pool.spawn(|| ()).unwrap();
        futures::executor::block_on(rx.recv()).unwrap().unwrap();
        pool.shutdown();

        assert!(pool.idle_time() >= Duration::from_millis(50));
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let pool = BlockingPool::new(&small_config()).unwrap();
        pool.shutdown();

        assert!(pool.is_shut_down());
        assert!(matches!(pool.execute(|| {}), Err(TaskError::PoolClosed)));

        // second shutdown is a no-op
        pool.shutdown();
    }
}
