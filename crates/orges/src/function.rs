//! The objective function as seen by the invoker.

use crate::{
    args::Args,
    error::TaskFailure,
    model::{TaskId, WorkerId},
};
use core::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execution context handed to the objective function.
///
/// Long-running functions should poll [`TaskContext::is_cancelled`] and return
/// early once it flips; cancellation is cooperative.
#[derive(Debug)]
pub struct TaskContext<'a> {
    task_id: TaskId,
    worker_id: WorkerId,
    token: &'a CancellationToken,
}

impl<'a> TaskContext<'a> {
    pub(crate) const fn new(
        task_id: TaskId,
        worker_id: WorkerId,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            task_id,
            worker_id,
            token,
        }
    }

    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub const fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The task's cancellation token, for functions that block on it.
    pub const fn token(&self) -> &CancellationToken {
        self.token
    }
}

type ObjectiveFn<R> = dyn Fn(&Args, &TaskContext<'_>) -> Result<R, TaskFailure> + Send + Sync;

/// A shareable objective function returning `R`.
///
/// Cloning is cheap; every clone calls the same closure.
pub struct Function<R> {
    inner: Arc<ObjectiveFn<R>>,
}

impl<R: 'static> Function<R> {
    /// Wraps an infallible function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Args) -> R + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |args: &Args, _: &TaskContext<'_>| Ok(f(args))),
        }
    }

    /// Wraps a function whose errors become [`TaskFailure::Failed`].
    pub fn fallible<F, E>(f: F) -> Self
    where
        F: Fn(&Args) -> Result<R, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Self {
            inner: Arc::new(move |args: &Args, _: &TaskContext<'_>| {
                f(args).map_err(TaskFailure::failed)
            }),
        }
    }

    /// Wraps a function that observes its [`TaskContext`].
    pub fn cancellable<F>(f: F) -> Self
    where
        F: Fn(&Args, &TaskContext<'_>) -> Result<R, TaskFailure> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }
}

impl<R> Function<R> {
    /// Applies the function.
    ///
    /// # Errors
    ///
    /// Whatever the wrapped function reports.
    pub fn call(&self, args: &Args, ctx: &TaskContext<'_>) -> Result<R, TaskFailure> {
        (self.inner)(args, ctx)
    }
}

impl<R> Clone for Function<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for Function<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}
