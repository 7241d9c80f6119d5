//! Messages exchanged between the dispatcher and its workers.
//!
//! A [`Task`] travels from the dispatcher to exactly one worker. The worker
//! answers with a [`WorkerMessage`] stream for that task:
//!
//! ```text
//! Start -> (Result | Error) -> Release
//! ```
//!
//! A task cancelled before it starts skips `Start`. A worker thread that
//! unwinds outside the task's panic boundary emits `Exited` from its drop
//! guard instead of the remaining messages.

use crate::{args::Args, error::TaskFailure, function::Function, params::ParamSpec};
use core::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Identifier of a task, unique for the lifetime of one invoker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a worker within one pool.
///
/// Replacement workers get fresh identifiers; an id is never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct WorkerId(usize);

impl WorkerId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One application of the objective function, as handed to a worker.
///
/// The caller's correlation data is not part of the task: it stays with the
/// dispatcher, which echoes it back when the outcome is delivered.
#[derive(Debug)]
pub struct Task<R> {
    pub id: TaskId,
    pub function: Function<R>,
    pub args: Arc<Args>,
    pub params: Arc<ParamSpec>,
    pub token: CancellationToken,
}

/// A worker began executing a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Start {
    pub worker_id: WorkerId,
    pub task: TaskId,
}

/// A task produced a value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskResult<R> {
    pub worker_id: WorkerId,
    pub task: TaskId,
    pub value: R,
}

/// A task failed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskError {
    pub worker_id: WorkerId,
    pub task: TaskId,
    pub value: TaskFailure,
}

/// A worker gave up its association with a task and is ready for the next
/// one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Release {
    pub worker_id: WorkerId,
    pub task: TaskId,
}

/// Everything a worker reports back to the dispatcher.
#[derive(Debug)]
pub enum WorkerMessage<R> {
    Start(Start),
    Result(TaskResult<R>),
    Error(TaskError),
    Release(Release),
    /// The worker thread is unwinding; whatever it was running is lost.
    Exited { worker_id: WorkerId },
}

impl<R> WorkerMessage<R> {
    /// Worker that sent the message.
    pub const fn worker_id(&self) -> WorkerId {
        match self {
            Self::Start(Start { worker_id, .. })
            | Self::Result(TaskResult { worker_id, .. })
            | Self::Error(TaskError { worker_id, .. })
            | Self::Release(Release { worker_id, .. })
            | Self::Exited { worker_id } => *worker_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_is_extracted_from_every_variant() {
        let worker_id = WorkerId::new(3);
        let task = TaskId::new(9);
        let messages: Vec<WorkerMessage<i64>> = vec![
            WorkerMessage::Start(Start { worker_id, task }),
            WorkerMessage::Result(TaskResult {
                worker_id,
                task,
                value: -3,
            }),
            WorkerMessage::Error(TaskError {
                worker_id,
                task,
                value: TaskFailure::Cancelled,
            }),
            WorkerMessage::Release(Release { worker_id, task }),
            WorkerMessage::Exited { worker_id },
        ];

        for message in &messages {
            assert_eq!(message.worker_id(), worker_id);
        }
    }

    #[test]
    fn ids_display_their_raw_value() {
        assert_eq!(TaskId::new(42).to_string(), "42");
        assert_eq!(WorkerId::new(7).to_string(), "7");
        assert!(TaskId::new(1) < TaskId::new(2));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn messages_cross_a_process_boundary_as_json() {
        let error = TaskError {
            worker_id: WorkerId::new(1),
            task: TaskId::new(5),
            value: TaskFailure::WorkerLost {
                worker_id: WorkerId::new(1),
            },
        };
        let json = serde_json::to_string(&error).unwrap();
        let decoded: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, error);

        let result = TaskResult {
            worker_id: WorkerId::new(0),
            task: TaskId::new(2),
            value: -4.5_f64,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"task\":2"));
    }
}
