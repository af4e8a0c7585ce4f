//! Blocking-task execution infrastructure.
//!
//! This module provides the fixed-size thread pool that runs `Blocking`
//! tasks on borrowed OS threads, the job type it executes, and the panic
//! containment shared by both execution paths.

pub mod blocking_pool;
pub mod job;
pub mod panic_handler;
pub mod worker;

pub use blocking_pool::{BlockingPool, JobReceiver};
pub use job::JobId;
pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
