//! Task descriptors handed to the queue.

use crate::error::TaskResult;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type BoxFuture = Pin<Box<dyn Future<Output = TaskResult> + Send + 'static>>;
pub type BlockingFn = Box<dyn FnOnce() -> TaskResult + Send + 'static>;

/// The unit of work, tagged by how it must be executed.
pub enum Callable {
    /// Awaited directly on the dispatch loop.
    Cooperative(BoxFuture),
    /// Run to completion on a borrowed thread of the blocking pool.
    Blocking(BlockingFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Cooperative,
    Blocking,
}

impl Callable {
    pub fn kind(&self) -> TaskKind {
        match self {
            Callable::Cooperative(_) => TaskKind::Cooperative,
            Callable::Blocking(_) => TaskKind::Blocking,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Cooperative(_) => f.write_str("Cooperative(..)"),
            Callable::Blocking(_) => f.write_str("Blocking(..)"),
        }
    }
}

/// A task waiting in, or popped from, the queue.
///
/// Arguments are bound when the descriptor is built: they are moved into
/// the callable and their `Debug` rendering is kept for log lines. Named
/// arguments are passed as a `#[derive(Debug)]` struct.
pub struct TaskDescriptor {
    pub(crate) id: TaskId,
    pub(crate) name: Cow<'static, str>,
    pub(crate) callable: Callable,
    pub(crate) args: String,
    pub(crate) submitted_at: Instant,
}

impl TaskDescriptor {
    /// Wrap an already-built callable that takes no arguments.
    pub fn new(name: impl Into<Cow<'static, str>>, callable: Callable) -> Self {
        Self::from_parts(name.into(), callable, String::from("()"))
    }

    pub fn blocking<F, A>(name: impl Into<Cow<'static, str>>, f: F, args: A) -> Self
    where
        F: FnOnce(A) -> TaskResult + Send + 'static,
        A: fmt::Debug + Send + 'static,
    {
        let rendered = format!("{:?}", args);
        let callable = Callable::Blocking(Box::new(move || f(args)));
        Self::from_parts(name.into(), callable, rendered)
    }

    pub fn cooperative<F, Fut, A>(name: impl Into<Cow<'static, str>>, f: F, args: A) -> Self
    where
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
        A: fmt::Debug + Send + 'static,
    {
        let rendered = format!("{:?}", args);
        // f is not called until the dispatch loop polls the task
        let callable = Callable::Cooperative(Box::pin(async move { f(args).await }));
        Self::from_parts(name.into(), callable, rendered)
    }

    fn from_parts(name: Cow<'static, str>, callable: Callable, args: String) -> Self {
        Self {
            id: TaskId::next(),
            name,
            callable,
            args,
            submitted_at: Instant::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TaskKind {
        self.callable.kind()
    }

    /// `Debug` rendering of the bound arguments.
    pub fn args(&self) -> &str {
        &self.args
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("args", &self.args)
            .finish()
    }
}
