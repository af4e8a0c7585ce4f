//! Metrics collection for queue monitoring.

use crate::error::{TaskError, TaskResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "telemetry")]
use hdrhistogram::Histogram;
#[cfg(feature = "telemetry")]
use parking_lot::RwLock;

// 1 hour in nanoseconds
#[cfg(feature = "telemetry")]
const HISTOGRAM_MAX_NS: u64 = 3_600_000_000_000;

/// Queue metrics collector
#[derive(Debug)]
pub struct QueueMetrics {
    // Task counters
    tasks_submitted: AtomicU64,
    tasks_rejected: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_panicked: AtomicU64,

    busy_time_ns: AtomicU64,

    // Latency histograms, None if the histogram could not be allocated
    #[cfg(feature = "telemetry")]
    wait_histogram: RwLock<Option<Histogram<u64>>>,
    #[cfg(feature = "telemetry")]
    exec_histogram: RwLock<Option<Histogram<u64>>>,

    start_time: Instant,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_rejected: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            busy_time_ns: AtomicU64::new(0),
            #[cfg(feature = "telemetry")]
            wait_histogram: RwLock::new(Histogram::new_with_max(HISTOGRAM_MAX_NS, 3).ok()),
            #[cfg(feature = "telemetry")]
            exec_histogram: RwLock::new(Histogram::new_with_max(HISTOGRAM_MAX_NS, 3).ok()),
            start_time: Instant::now(),
        }
    }

    pub fn record_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one finished task: how long it sat in the queue, how long it
    /// ran, and how it ended.
    pub fn record_outcome(&self, waited: Duration, ran: Duration, outcome: &TaskResult) {
        match outcome {
            Ok(()) => self.tasks_completed.fetch_add(1, Ordering::Relaxed),
            Err(TaskError::Panicked(_)) => self.tasks_panicked.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.tasks_failed.fetch_add(1, Ordering::Relaxed),
        };

        let ran_ns = duration_ns(ran);
        self.busy_time_ns.fetch_add(ran_ns, Ordering::Relaxed);

        #[cfg(feature = "telemetry")]
        {
            if let Some(hist) = self.wait_histogram.write().as_mut() {
                let _ = hist.record(duration_ns(waited).min(HISTOGRAM_MAX_NS));
            }
            if let Some(hist) = self.exec_histogram.write().as_mut() {
                let _ = hist.record(ran_ns.min(HISTOGRAM_MAX_NS));
            }
        }
        #[cfg(not(feature = "telemetry"))]
        let _ = waited;
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            timestamp: Instant::now(),
            uptime: self.start_time.elapsed(),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            busy_time_ns: self.busy_time_ns.load(Ordering::Relaxed),
            avg_exec_ns: 0,
            p50_exec_ns: 0,
            p99_exec_ns: 0,
            max_exec_ns: 0,
            p99_wait_ns: 0,
        };

        #[cfg(feature = "telemetry")]
        {
            if let Some(hist) = self.exec_histogram.read().as_ref() {
                if hist.len() > 0 {
                    snapshot.avg_exec_ns = hist.mean() as u64;
                    snapshot.p50_exec_ns = hist.value_at_quantile(0.50);
                    snapshot.p99_exec_ns = hist.value_at_quantile(0.99);
                    snapshot.max_exec_ns = hist.max();
                }
            }
            if let Some(hist) = self.wait_histogram.read().as_ref() {
                if hist.len() > 0 {
                    snapshot.p99_wait_ns = hist.value_at_quantile(0.99);
                }
            }
        }
        #[cfg(not(feature = "telemetry"))]
        {
            let finished = snapshot.tasks_finished();
            if finished > 0 {
                snapshot.avg_exec_ns = snapshot.busy_time_ns / finished;
            }
        }

        snapshot
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.tasks_submitted.store(0, Ordering::Relaxed);
        self.tasks_rejected.store(0, Ordering::Relaxed);
        self.tasks_completed.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.tasks_panicked.store(0, Ordering::Relaxed);
        self.busy_time_ns.store(0, Ordering::Relaxed);

        #[cfg(feature = "telemetry")]
        {
            if let Some(hist) = self.wait_histogram.write().as_mut() {
                hist.reset();
            }
            if let Some(hist) = self.exec_histogram.write().as_mut() {
                hist.reset();
            }
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: Instant,
    pub uptime: Duration,
    pub tasks_submitted: u64,
    pub tasks_rejected: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_panicked: u64,
    pub busy_time_ns: u64,
    pub avg_exec_ns: u64,
    pub p50_exec_ns: u64,
    pub p99_exec_ns: u64,
    pub max_exec_ns: u64,
    pub p99_wait_ns: u64,
}

impl MetricsSnapshot {
    /// Tasks that ran to an end, successful or not.
    pub fn tasks_finished(&self) -> u64 {
        self.tasks_completed + self.tasks_failed + self.tasks_panicked
    }

    /// Fraction of finished tasks that failed or panicked (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        let finished = self.tasks_finished();
        if finished == 0 {
            return 0.0;
        }
        (self.tasks_failed + self.tasks_panicked) as f64 / finished as f64
    }

    /// Calculate tasks per second
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.tasks_finished() as f64 / seconds
    }
}
