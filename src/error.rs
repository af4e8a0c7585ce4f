pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a single task body. Never surfaced to the submitter.
pub type TaskResult = std::result::Result<(), TaskError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task queue has not been started")]
    QueueNotStarted,

    #[error("task queue is closed, no new tasks are accepted")]
    QueueClosed,

    #[error("no tokio runtime is available to host the dispatch loop")]
    NoRuntime,

    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("logging error: {0}")]
    Logging(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn logging<S: Into<String>>(msg: S) -> Self {
        Error::Logging(msg.into())
    }
}

/// Execution-time failure of a dispatched task.
///
/// These are caught at the dispatch boundary, logged, and counted. They
/// never stop the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("blocking pool is shut down")]
    PoolClosed,
}

impl TaskError {
    pub fn failed<S: Into<String>>(msg: S) -> Self {
        TaskError::Failed(msg.into())
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for TaskError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        TaskError::Failed(err.to_string())
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Failed(err.to_string())
    }
}

impl From<String> for TaskError {
    fn from(msg: String) -> Self {
        TaskError::Failed(msg)
    }
}

impl From<&str> for TaskError {
    fn from(msg: &str) -> Self {
        TaskError::Failed(msg.to_string())
    }
}
