use super::{WorkRequest, worker::worker_loop};
use crate::{
    args::Args,
    caller::{SharedCaller, deliver},
    error::{Error, Result, TaskFailure},
    invoker::Settings,
    model::{TaskId, WorkerId, WorkerMessage},
    stoppable::Lifecycle,
};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex, RwLock};
use portable_atomic::AtomicU64;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

/// State shared between the invoker front end and its dispatcher thread.
pub(super) struct Shared<R, K> {
    pub settings: RwLock<Settings<R, K>>,
    pub lifecycle: Lifecycle,
    pub next_task: AtomicU64,
    pub state: Mutex<PoolState<R, K>>,
    /// Signalled when a worker becomes idle or the pool stops.
    pub capacity: Condvar,
    /// Signalled when the outstanding count drops to zero.
    pub drained: Condvar,
    pub messages: Sender<WorkerMessage<R>>,
    pub cancel_grace: Duration,
}

impl<R, K> Shared<R, K> {
    /// Accounts for `delivered` callbacks that have returned.
    pub fn finish(&self, delivered: usize) {
        if delivered == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(delivered);
        if state.outstanding == 0 {
            self.drained.notify_all();
        }
    }
}

pub(super) struct WorkerSlot<R> {
    pub tx: Sender<WorkRequest<R>>,
    /// Task currently assigned to the worker, until its `Release`.
    pub task: Option<TaskId>,
    pub handle: JoinHandle<()>,
}

/// An accepted task whose callback has not been delivered yet.
pub(super) struct Pending<R, K> {
    pub worker: WorkerId,
    pub fargs: Arc<Args>,
    pub kwargs: K,
    pub caller: SharedCaller<R, K>,
    pub token: CancellationToken,
    pub started: bool,
    pub deadline: Option<Instant>,
    /// Once passed, the dispatcher gives up on the worker.
    pub reap_at: Option<Instant>,
}

impl<R, K> Pending<R, K> {
    pub fn into_delivery(self, outcome: core::result::Result<R, TaskFailure>) -> Delivery<R, K> {
        Delivery {
            caller: self.caller,
            outcome,
            fargs: self.fargs,
            kwargs: self.kwargs,
        }
    }

    /// Next instant at which the dispatcher has to look at this task.
    fn next_wake(&self) -> Option<Instant> {
        match (self.deadline, self.reap_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// A callback ready to be made outside the state lock.
pub(super) struct Delivery<R, K> {
    caller: SharedCaller<R, K>,
    outcome: core::result::Result<R, TaskFailure>,
    fargs: Arc<Args>,
    kwargs: K,
}

impl<R, K> Delivery<R, K> {
    pub fn deliver(self) {
        let Self {
            caller,
            outcome,
            fargs,
            kwargs,
        } = self;
        deliver(&caller, outcome, Arc::unwrap_or_clone(fargs), kwargs);
    }
}

pub(super) struct PoolState<R, K> {
    pub workers: HashMap<WorkerId, WorkerSlot<R>>,
    pub idle: VecDeque<WorkerId>,
    pub pending: HashMap<TaskId, Pending<R, K>>,
    /// Accepted tasks whose callback has not returned yet.
    pub outstanding: usize,
    next_worker: usize,
}

impl<R, K> PoolState<R, K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            workers: HashMap::with_capacity(capacity),
            idle: VecDeque::with_capacity(capacity),
            pending: HashMap::with_capacity(capacity),
            outstanding: 0,
            next_worker: 0,
        }
    }

    /// Removes a worker from the pool. Dropping the returned slot closes the
    /// worker's channel, so the thread exits after its current task.
    pub fn retire(&mut self, worker_id: WorkerId) -> Option<WorkerSlot<R>> {
        self.idle.retain(|id| *id != worker_id);
        self.workers.remove(&worker_id)
    }

    pub fn next_wake(&self) -> Option<Instant> {
        self.pending.values().filter_map(Pending::next_wake).min()
    }
}

impl<R: Send + 'static, K> PoolState<R, K> {
    /// Spawns a worker with a fresh id and marks it idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerSpawn`] if the OS refuses the thread.
    pub fn spawn_worker(&mut self, messages: &Sender<WorkerMessage<R>>) -> Result<WorkerId> {
        let worker_id = WorkerId::new(self.next_worker);
        self.next_worker += 1;

        let (tx, rx) = crossbeam_channel::bounded(1);
        let messages = messages.clone();
        let handle = thread::Builder::new()
            .name(format!("orges-worker-{worker_id}"))
            .spawn(move || worker_loop(worker_id, rx, messages))
            .map_err(|e| Error::WorkerSpawn {
                context: format!("Worker {worker_id}: {e}"),
            })?;

        self.workers.insert(
            worker_id,
            WorkerSlot {
                tx,
                task: None,
                handle,
            },
        );
        self.idle.push_back(worker_id);

        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {worker_id} spawned");

        Ok(worker_id)
    }
}
