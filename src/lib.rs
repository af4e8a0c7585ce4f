//! taskq - an in-process asynchronous task queue
//!
//! Callers on any thread submit named units of work; a single dispatch loop
//! running on a tokio runtime executes them one at a time, in the order they
//! were accepted. Blocking work is offloaded to a fixed pool of worker
//! threads so it never stalls the loop, and shutdown drains what was
//! accepted within a bounded time.
//!
//! # Quick Start
//!
//! ```no_run
//! use taskq::prelude::*;
//!
//! #[derive(Debug)]
//! struct Report {
//!     day: &'static str,
//! }
//!
//! #[tokio::main]
//! async fn main() -> taskq::Result<()> {
//!     taskq::telemetry::init_logging("info")?;
//!
//!     let queue = TaskQueue::with_defaults()?;
//!     queue.start()?;
//!
//!     queue.submit_blocking(
//!         "render_report",
//!         |report: Report| {
//!             println!("rendering {}", report.day);
//!             Ok(())
//!         },
//!         Report { day: "2022-05-01" },
//!     )?;
//!     queue.submit_cooperative("ping", |_: ()| async { Ok(()) }, ())?;
//!
//!     let report = queue.shutdown().await;
//!     assert!(report.drained);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **FIFO dispatch**: one task at a time, in acceptance order
//! - **Blocking offload**: a bounded thread pool for synchronous work
//! - **Failure isolation**: errors and panics are logged, never fatal to the loop
//! - **Graceful shutdown**: drain with a deadline, then stop
//! - **Telemetry**: counters always, latency histograms with `telemetry`

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod queue;
pub mod telemetry;

pub use config::{QueueConfig, QueueConfigBuilder};
pub use error::{Error, Result, TaskError, TaskResult};
pub use executor::PanicStrategy;
pub use queue::{Callable, QueuePhase, ShutdownReport, TaskDescriptor, TaskId, TaskKind, TaskQueue};
