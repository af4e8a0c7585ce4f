// blocking pool worker thread
use super::job::Job;
use crossbeam_deque::{Injector, Steal};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub type WorkerId = usize;

// stats for each worker
#[derive(Debug)]
pub struct WorkerState {
    pub jobs_executed: AtomicU64,
    pub jobs_panicked: AtomicU64,
    pub idle_time_ns: AtomicU64,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            jobs_executed: AtomicU64::new(0),
            jobs_panicked: AtomicU64::new(0),
            idle_time_ns: AtomicU64::new(0),
        }
    }
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub state: Arc<WorkerState>,
}

impl Worker {
    const MAX_SPINS: u32 = 10;
    const MAX_YIELDS: u32 = 20;
    const PARK_TIMEOUT: Duration = Duration::from_millis(10);

    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            state: Arc::new(WorkerState::new()),
        }
    }

    // main loop; exits only once shutdown is set and the injector is empty
    pub fn run(&self, injector: Arc<Injector<Job>>, shutdown: Arc<AtomicBool>, queued: Arc<AtomicUsize>) {
        let mut backoff_cnt = 0;
        let mut idle_since: Option<Instant> = None;

        loop {
            if let Some(job) = Self::find_job(&injector) {
                backoff_cnt = 0;
                if let Some(since) = idle_since.take() {
                    self.record_idle(since);
                }
                self.execute_job(job);
                queued.fetch_sub(1, Ordering::AcqRel);
                continue;
            }

            if shutdown.load(Ordering::Acquire) {
                // submissions stop before the flag is raised, so one more
                // look at the injector sees everything that was accepted
                match Self::find_job(&injector) {
                    Some(job) => {
                        self.execute_job(job);
                        queued.fetch_sub(1, Ordering::AcqRel);
                        continue;
                    }
                    None => break,
                }
            }

            idle_since.get_or_insert_with(Instant::now);
            self.backoff(&mut backoff_cnt);
        }

        if let Some(since) = idle_since {
            self.record_idle(since);
        }
        tracing::trace!(worker = self.id, "blocking worker exiting");
    }

    fn find_job(injector: &Injector<Job>) -> Option<Job> {
        loop {
            match injector.steal() {
                Steal::Success(job) => return Some(job),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    fn execute_job(&self, job: Job) {
        let id = job.id;
        let waited = job.spawn_time.elapsed();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            job.execute();
        }));

        if result.is_err() {
            tracing::error!(worker = self.id, job = ?id, "job panicked");
            self.state.jobs_panicked.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::trace!(worker = self.id, job = ?id, waited_us = waited.as_micros() as u64, "job done");
        }

        self.state.jobs_executed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_idle(&self, since: Instant) {
        self.state
            .idle_time_ns
            .fetch_add(since.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }

    fn backoff(&self, count: &mut u32) {
        *count += 1;

        if *count <= Self::MAX_SPINS {
            let spins = (*count).min(6);
            for _ in 0..(1 << spins) {
                std::hint::spin_loop();
            }
        } else if *count <= Self::MAX_YIELDS {
            thread::yield_now();
        } else {
            thread::park_timeout(Self::PARK_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_jobs_queued_before_shutdown() {
        let worker = Worker::new(0);
        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        queued.fetch_add(1, Ordering::AcqRel);
        injector.push(Job::new(move || flag.store(true, Ordering::SeqCst)));
        shutdown.store(true, Ordering::Release);

        worker.run(injector.clone(), shutdown, queued.clone());

        assert!(ran.load(Ordering::SeqCst));
        assert!(injector.is_empty());
        assert_eq!(queued.load(Ordering::Acquire), 0);
        assert_eq!(worker.state.jobs_executed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_panicking_job_is_counted() {
        let worker = Worker::new(1);
        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(true));
        let queued = Arc::new(AtomicUsize::new(2));

        let explode = true;
        injector.push(Job::new(move || {
            if explode {
                panic!("job blew up");
            }
        }));
        injector.push(Job::new(|| {}));

        worker.run(injector, shutdown, queued.clone());

        assert_eq!(queued.load(Ordering::Acquire), 0);
        assert_eq!(worker.state.jobs_executed.load(Ordering::Relaxed), 2);
        assert_eq!(worker.state.jobs_panicked.load(Ordering::Relaxed), 1);
    }
}
