//! Unit of work executed by the blocking pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pool job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        JobId(JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct Job {
    pub(crate) id: JobId,
    pub(crate) func: Box<dyn FnOnce() + Send + 'static>,
    pub(crate) spawn_time: Instant,
}

impl Job {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Job {
            id: JobId::next(),
            func: Box::new(f),
            spawn_time: Instant::now(),
        }
    }

    pub fn execute(self) {
        (self.func)();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("spawn_time", &self.spawn_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_job_ids_increase() {
        let a = Job::new(|| {});
        let b = Job::new(|| {});
        assert_ne!(a.id, b.id);
        assert!(a.id.0 < b.id.0);
    }

    #[test]
    fn test_job_execute() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        Job::new(move || flag.store(true, Ordering::SeqCst)).execute();
        assert!(ran.load(Ordering::SeqCst));
    }
}
