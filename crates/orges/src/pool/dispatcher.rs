use super::{
    Control, WorkRequest,
    state::{Delivery, PoolState, Shared},
};
use crate::{
    error::TaskFailure,
    model::{Release, Start, TaskError, TaskId, TaskResult, WorkerId, WorkerMessage},
};
use crossbeam_channel::{Receiver, at, never, select};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

/// The pool's single delivery point.
///
/// Consumes worker messages and control events, keeps the pool state in step
/// with them and makes every callback, one at a time, outside the state lock.
pub(super) struct Dispatcher<R, K> {
    shared: Arc<Shared<R, K>>,
    messages: Receiver<WorkerMessage<R>>,
    control: Receiver<Control>,
}

impl<R, K> Dispatcher<R, K>
where
    R: Send + 'static,
    K: Send + 'static,
{
    pub const fn new(
        shared: Arc<Shared<R, K>>,
        messages: Receiver<WorkerMessage<R>>,
        control: Receiver<Control>,
    ) -> Self {
        Self {
            shared,
            messages,
            control,
        }
    }

    pub fn run(self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Dispatcher started");

        loop {
            let wake = self.shared.state.lock().next_wake();
            let timer = wake.map_or_else(never, at);

            select! {
                recv(self.messages) -> message => match message {
                    Ok(message) => self.on_message(message),
                    Err(_) => break,
                },
                recv(self.control) -> control => match control {
                    Ok(Control::Shutdown) | Err(_) => break,
                    Ok(control) => self.on_control(control),
                },
                recv(timer) -> _ => {}
            }

            self.reap_expired(Instant::now());
        }

        self.shutdown();

        #[cfg(feature = "tracing")]
        tracing::debug!("Dispatcher stopped");
    }

    fn on_message(&self, message: WorkerMessage<R>) {
        match message {
            WorkerMessage::Start(Start { worker_id, task }) => self.on_start(worker_id, task),
            WorkerMessage::Result(TaskResult {
                worker_id,
                task,
                value,
            }) => self.complete(worker_id, task, Ok(value)),
            WorkerMessage::Error(TaskError {
                worker_id,
                task,
                value,
            }) => self.complete(worker_id, task, Err(value)),
            WorkerMessage::Release(Release { worker_id, task }) => {
                self.on_release(worker_id, task);
            }
            WorkerMessage::Exited { worker_id } => self.on_exited(worker_id),
        }
    }

    fn on_start(&self, worker_id: WorkerId, task: TaskId) {
        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {worker_id} started task {task}");

        let mut state = self.shared.state.lock();
        if let Some(pending) = state.pending.get_mut(&task) {
            if pending.worker != worker_id {
                return;
            }
            pending.started = true;
            if pending.token.is_cancelled() && pending.reap_at.is_none() {
                pending.reap_at = Some(Instant::now() + self.shared.cancel_grace);
            }
        }
    }

    fn complete(
        &self,
        worker_id: WorkerId,
        task: TaskId,
        outcome: Result<R, TaskFailure>,
    ) {
        let delivery = {
            let mut state = self.shared.state.lock();
            let assigned = state
                .pending
                .get(&task)
                .is_some_and(|pending| pending.worker == worker_id);
            // Otherwise already settled by the dispatcher; the worker was retired.
            if assigned {
                state
                    .pending
                    .remove(&task)
                    .map(|pending| pending.into_delivery(outcome))
            } else {
                None
            }
        };

        if let Some(delivery) = delivery {
            #[cfg(feature = "tracing")]
            tracing::trace!("Delivering outcome of task {task}");
            self.deliver(vec![delivery]);
        }
    }

    fn on_release(&self, worker_id: WorkerId, task: TaskId) {
        let mut state = self.shared.state.lock();
        let Some(slot) = state.workers.get_mut(&worker_id) else {
            return;
        };
        if slot.task == Some(task) {
            slot.task = None;
            state.idle.push_back(worker_id);
            self.shared.capacity.notify_one();
        }
    }

    fn on_exited(&self, worker_id: WorkerId) {
        let delivery = {
            let mut state = self.shared.state.lock();
            let Some(slot) = state.retire(worker_id) else {
                return;
            };

            #[cfg(feature = "tracing")]
            tracing::warn!("Worker {worker_id} died, replacing it");

            self.replace(&mut state);
            slot.task
                .and_then(|task| state.pending.remove(&task))
                .map(|pending| pending.into_delivery(Err(TaskFailure::WorkerLost { worker_id })))
        };

        if let Some(delivery) = delivery {
            self.deliver(vec![delivery]);
        }
    }

    fn on_control(&self, control: Control) {
        let mut state = self.shared.state.lock();
        match control {
            Control::Cancel(task) => {
                if let Some(pending) = state.pending.get_mut(&task) {
                    pending.token.cancel();
                    if pending.started && pending.reap_at.is_none() {
                        pending.reap_at = Some(Instant::now() + self.shared.cancel_grace);
                    }
                }
            }
            Control::Deadline(task, deadline) => {
                if let Some(pending) = state.pending.get_mut(&task) {
                    pending.deadline =
                        Some(pending.deadline.map_or(deadline, |d| d.min(deadline)));
                }
            }
            Control::Shutdown => {}
        }
    }

    /// Fires due deadlines and gives up on workers that ignored a
    /// cancellation for longer than the grace period.
    fn reap_expired(&self, now: Instant) {
        let deliveries = {
            let mut state = self.shared.state.lock();
            let grace = self.shared.cancel_grace;

            for pending in state.pending.values_mut() {
                if pending.deadline.is_some_and(|deadline| deadline <= now) {
                    pending.deadline = None;
                    pending.token.cancel();
                    if pending.started && pending.reap_at.is_none() {
                        pending.reap_at = Some(now + grace);
                    }
                }
            }

            let expired: Vec<TaskId> = state
                .pending
                .iter()
                .filter(|(_, pending)| pending.reap_at.is_some_and(|at| at <= now))
                .map(|(task, _)| *task)
                .collect();

            let mut deliveries = Vec::with_capacity(expired.len());
            for task in expired {
                let Some(pending) = state.pending.remove(&task) else {
                    continue;
                };

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Worker {} ignored cancellation of task {task}, retiring it",
                    pending.worker
                );

                // Detached: the thread exits once its function returns.
                drop(state.retire(pending.worker));
                self.replace(&mut state);
                deliveries.push(pending.into_delivery(Err(TaskFailure::Cancelled)));
            }
            deliveries
        };

        self.deliver(deliveries);
    }

    fn replace(&self, state: &mut PoolState<R, K>) {
        if self.shared.lifecycle.is_stopped() {
            // A stopped pool accepts no more work, so lost capacity stays
            // lost; blocked `invoke` calls are woken by `stop` itself.
            self.shared.capacity.notify_all();
            return;
        }
        match state.spawn_worker(&self.shared.messages) {
            Ok(_) => {
                self.shared.capacity.notify_one();
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to replace worker: {_e}");
                self.shared.capacity.notify_all();
            }
        }
    }

    fn deliver(&self, deliveries: Vec<Delivery<R, K>>) {
        let delivered = deliveries.len();
        for delivery in deliveries {
            // A panicking caller must not take the dispatcher down with it.
            if panic::catch_unwind(AssertUnwindSafe(|| delivery.deliver())).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Caller panicked while handling an outcome");
            }
        }
        self.shared.finish(delivered);
    }

    fn shutdown(&self) {
        let idle = {
            let mut state = self.shared.state.lock();
            let mut idle = Vec::with_capacity(state.idle.len());
            for (worker_id, slot) in state.workers.drain() {
                // Each channel holds at most the one task being run, so there
                // is always room for the request.
                let _ = slot.tx.try_send(WorkRequest::Shutdown);
                if slot.task.is_none() {
                    idle.push((worker_id, slot.handle));
                }
            }
            state.idle.clear();

            // Undelivered callbacks are dropped with the pool.
            state.pending.clear();
            state.outstanding = 0;
            self.shared.drained.notify_all();
            self.shared.capacity.notify_all();
            idle
        };

        for (_worker_id, handle) in idle {
            if handle.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!("Worker {_worker_id} panicked during shutdown");
            }
        }
    }
}
