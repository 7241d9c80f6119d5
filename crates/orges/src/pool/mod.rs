//! Thread pool execution of tasks.
//!
//! [`ThreadPoolInvoker`] owns a fixed number of worker threads and a single
//! dispatcher thread:
//!
//! - `invoke` assigns each task to an idle worker over that worker's bounded
//!   channel, blocking while none is idle.
//! - Workers report [`WorkerMessage`](crate::WorkerMessage)s to the
//!   dispatcher, which is the only thread that calls into the caller.
//! - Task handles send [`Control`] events to the dispatcher, which also
//!   enforces deadlines and replaces workers that die or ignore a
//!   cancellation for longer than the configured grace period.

mod dispatcher;
mod manager;
mod state;
mod worker;

#[cfg(test)]
mod tests;

pub use manager::*;
pub(crate) use worker::execute;

use crate::model::{Task, TaskId};
use std::time::Instant;

/// Work handed to a single worker thread.
#[derive(Debug)]
pub(crate) enum WorkRequest<R> {
    Execute(Task<R>),
    /// Exit once the current task, if any, is finished.
    Shutdown,
}

/// Events sent to the dispatcher from outside the worker protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    /// The task's token has been cancelled.
    Cancel(TaskId),
    /// Cancel the task at the given instant unless it finished before.
    Deadline(TaskId, Instant),
    /// The invoker is being dropped.
    Shutdown,
}
