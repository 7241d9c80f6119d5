//! Error types for the invocation subsystem.
//!
//! Two families of failure exist and they never mix:
//!
//! - [`Error`] is returned synchronously from invoker operations. It covers
//!   configuration mistakes and stop-state violations only.
//! - [`TaskFailure`] describes why a single task did not produce a value. It
//!   is never returned from `invoke`; it is delivered to the caller through
//!   `on_error`.

use crate::model::WorkerId;

/// Result type returned by invoker operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Synchronous failures of the invocation subsystem.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The coordinator has been stopped and refuses new work.
    #[error("Invoker has been stopped")]
    Stopped,

    /// A configuration request was malformed (e.g. a worker count of zero).
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// No parameter specification was configured before invoking.
    #[error("No parameter specification configured")]
    NoParamSpec,

    /// No objective function was configured before invoking.
    #[error("No objective function configured")]
    NoFunction,

    /// No caller was configured before invoking.
    #[error("No caller configured")]
    NoCaller,

    /// A worker thread could not be spawned.
    #[error("Failed to spawn worker: {context}")]
    WorkerSpawn { context: String },

    /// Internal channel send/receive failure between the dispatcher and a
    /// worker.
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

/// Why a task ended without a value.
///
/// Delivered to `Caller::on_error` together with the task's arguments and
/// correlation data.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum TaskFailure {
    /// The task was cancelled through its handle or by a deadline.
    #[error("Task was cancelled")]
    Cancelled,

    /// The objective function panicked.
    #[error("Objective function panicked: {message}")]
    Panicked { message: String },

    /// The objective function returned an error.
    #[error("Objective function failed: {message}")]
    Failed { message: String },

    /// The arguments do not match the configured parameter specification.
    #[error("Call not possible: {reason}")]
    CallNotPossible { reason: String },

    /// The worker running the task died before reporting an outcome.
    #[error("Worker {worker_id} was lost while running the task")]
    WorkerLost { worker_id: WorkerId },
}

impl TaskFailure {
    /// Builds a [`TaskFailure::Failed`] from any displayable error.
    pub fn failed(err: impl core::fmt::Display) -> Self {
        Self::Failed {
            message: err.to_string(),
        }
    }
}
