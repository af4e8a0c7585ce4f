pub use crate::config::{QueueConfig, QueueConfigBuilder};
pub use crate::error::{Error, Result, TaskError, TaskResult};
pub use crate::executor::PanicStrategy;
pub use crate::queue::{Callable, QueuePhase, ShutdownReport, TaskDescriptor, TaskId, TaskKind, TaskQueue};

pub use crate::telemetry::MetricsSnapshot;
