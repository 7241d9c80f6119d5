use crate::{model::TaskId, pool::Control};
use crossbeam_channel::Sender;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Handle to an accepted task, used to request its cancellation.
///
/// Cancellation is a request. A task that has not started yet never starts;
/// a running task sees its [`TaskContext`](crate::TaskContext) flip and is
/// reported as [`TaskFailure::Cancelled`](crate::TaskFailure::Cancelled). A
/// pool that does not hear back from the worker within its grace period
/// reports the cancellation itself and replaces the worker.
///
/// Handles are cheap to clone and outliving the task is harmless.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: TaskId,
    token: CancellationToken,
    control: Option<Sender<Control>>,
}

impl TaskHandle {
    pub(crate) const fn new(
        id: TaskId,
        token: CancellationToken,
        control: Option<Sender<Control>>,
    ) -> Self {
        Self { id, token, control }
    }

    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Requests cancellation now.
    pub fn cancel(&self) {
        self.token.cancel();
        self.notify(Control::Cancel(self.id));
    }

    /// Requests cancellation once `timeout` has elapsed, unless the task has
    /// finished by then. The deadline lives with the task and disappears with
    /// it.
    pub fn cancel_after(&self, timeout: Duration) {
        if let Some(deadline) = Instant::now().checked_add(timeout) {
            self.notify(Control::Deadline(self.id, deadline));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn notify(&self, control: Control) {
        if let Some(tx) = &self.control {
            // The pool may be gone already; then there is nothing to cancel.
            let _ = tx.send(control);
        }
    }
}
