use crate::error::{Error, Result};
use crate::executor::PanicStrategy;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Size of the fixed pool that runs blocking tasks.
    pub worker_threads: usize,
    /// Upper bound on how long the dispatch loop waits on an empty queue
    /// before checking again.
    pub idle_poll_interval: Duration,
    /// How often the shutdown coordinator re-checks pending/active counts.
    pub drain_poll_interval: Duration,
    /// Budget for the drain wait in [`TaskQueue::shutdown`](crate::TaskQueue::shutdown).
    pub shutdown_timeout: Duration,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
    /// What to do when a task panics, on either execution path.
    pub panic_strategy: PanicStrategy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            idle_poll_interval: Duration::from_millis(100),
            drain_poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(300),
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "taskq-blocking".to_string(),
            panic_strategy: PanicStrategy::default(),
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::config("worker_threads must be > 0"));
        }
        if self.worker_threads > 1024 {
            return Err(Error::config("worker_threads too large (max 1024)"));
        }

        if self.idle_poll_interval.is_zero() {
            return Err(Error::config("idle_poll_interval must be > 0"));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(Error::config("drain_poll_interval must be > 0"));
        }

        if let Some(size) = self.stack_size {
            if size < 64 * 1024 {
                return Err(Error::config("stack_size must be at least 64 KiB"));
            }
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
        }
    }

    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    pub fn idle_poll_interval(mut self, interval: Duration) -> Self {
        self.config.idle_poll_interval = interval;
        self
    }

    pub fn drain_poll_interval(mut self, interval: Duration) -> Self {
        self.config.drain_poll_interval = interval;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<QueueConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
