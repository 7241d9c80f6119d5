use super::{
    Control, WorkRequest,
    dispatcher::Dispatcher,
    state::{Pending, PoolState, Shared},
};
use crate::{
    args::Args,
    caller::SharedCaller,
    error::{Error, Result},
    function::Function,
    invoker::{Invoker, Settings, TaskHandle},
    model::{Task, TaskId},
    params::{ParamSpec, ReturnSpec},
    stoppable::{Lifecycle, Stoppable},
    worker_count::WorkerCount,
};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex, RwLock};
use portable_atomic::{AtomicU64, Ordering};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Configuration of a [`ThreadPoolInvoker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: WorkerCount,
    /// How long a cancelled task may keep running before the pool reports it
    /// cancelled and replaces its worker.
    pub cancel_grace: Duration,
}

impl PoolConfig {
    pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(100);

    pub const fn new(workers: WorkerCount) -> Self {
        Self {
            workers,
            cancel_grace: Self::DEFAULT_CANCEL_GRACE,
        }
    }

    #[must_use]
    pub const fn with_cancel_grace(mut self, cancel_grace: Duration) -> Self {
        self.cancel_grace = cancel_grace;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(WorkerCount::Auto)
    }
}

/// An invoker that runs tasks on a pool of worker threads.
///
/// `invoke` returns as soon as the task is handed to an idle worker and
/// blocks while all of them are busy. Outcomes are delivered from a single
/// dispatcher thread, so callbacks never overlap even though tasks run in
/// parallel.
///
/// Dropping the invoker stops it and shuts the pool down. Callbacks that
/// have not been delivered by then are discarded; call
/// [`wait`](Invoker::wait) first to drain them.
pub struct ThreadPoolInvoker<R, K> {
    shared: Arc<Shared<R, K>>,
    control: Sender<Control>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<R, K> ThreadPoolInvoker<R, K>
where
    R: Send + 'static,
    K: Send + 'static,
{
    /// Spawns the workers and the dispatcher.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the worker count cannot be resolved.
    /// - [`Error::WorkerSpawn`] if a thread cannot be spawned.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug"))]
    pub fn new(config: PoolConfig) -> Result<Self> {
        let workers = config.workers.resolve()?;

        let (message_tx, message_rx) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();

        let mut state = PoolState::new(workers);
        for _ in 0..workers {
            // On failure the spawned workers see their channels close and exit.
            state.spawn_worker(&message_tx)?;
        }

        let shared = Arc::new(Shared {
            settings: RwLock::new(Settings::default()),
            lifecycle: Lifecycle::new(),
            next_task: AtomicU64::new(0),
            state: Mutex::new(state),
            capacity: Condvar::new(),
            drained: Condvar::new(),
            messages: message_tx,
            cancel_grace: config.cancel_grace,
        });

        let dispatcher = Dispatcher::new(Arc::clone(&shared), message_rx, control_rx);
        let dispatcher = thread::Builder::new()
            .name("orges-dispatcher".to_owned())
            .spawn(move || dispatcher.run())
            .map_err(|e| Error::WorkerSpawn {
                context: format!("Dispatcher: {e}"),
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Thread pool invoker started with {workers} workers");

        Ok(Self {
            shared,
            control: control_tx,
            dispatcher: Some(dispatcher),
        })
    }

    /// Current number of worker threads.
    pub fn workers(&self) -> usize {
        self.shared.state.lock().workers.len()
    }
}

impl<R, K> Stoppable for ThreadPoolInvoker<R, K> {
    fn stop(&self) {
        if self.shared.lifecycle.stop() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Thread pool invoker stopped");
        }
        // Taking the lock orders this wake-up after any `invoke` that checked
        // the lifecycle and is about to wait.
        let _state = self.shared.state.lock();
        self.shared.capacity.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.shared.lifecycle.is_stopped()
    }
}

impl<R, K> Invoker<R, K> for ThreadPoolInvoker<R, K>
where
    R: Send + 'static,
    K: Send + 'static,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    fn invoke(&self, fargs: Args, kwargs: K) -> Result<TaskHandle> {
        let shared = &*self.shared;
        shared.lifecycle.run(|| {
            let snapshot = shared.settings.read().snapshot()?;
            let id = TaskId::new(shared.next_task.fetch_add(1, Ordering::Relaxed));
            let token = CancellationToken::new();
            let fargs = Arc::new(fargs);

            let mut request = WorkRequest::Execute(Task {
                id,
                function: snapshot.function,
                args: Arc::clone(&fargs),
                params: snapshot.params,
                token: token.clone(),
            });

            let mut state = shared.state.lock();
            let worker = loop {
                shared.lifecycle.ensure_running()?;

                let Some(worker_id) = state.idle.pop_front() else {
                    if state.workers.is_empty() {
                        return Err(Error::WorkerSpawn {
                            context: "No workers left in the pool".to_owned(),
                        });
                    }
                    shared.capacity.wait(&mut state);
                    continue;
                };

                let Some(slot) = state.workers.get_mut(&worker_id) else {
                    continue;
                };
                match slot.tx.try_send(request) {
                    Ok(()) => {
                        slot.task = Some(id);
                        break worker_id;
                    }
                    Err(err) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Worker {worker_id} is unreachable, retiring it");
                        request = err.into_inner();
                        drop(state.retire(worker_id));
                    }
                }
            };

            state.pending.insert(
                id,
                Pending {
                    worker,
                    fargs,
                    kwargs,
                    caller: snapshot.caller,
                    token: token.clone(),
                    started: false,
                    deadline: None,
                    reap_at: None,
                },
            );
            state.outstanding += 1;

            #[cfg(feature = "tracing")]
            tracing::trace!("Task {id} dispatched to worker {worker}");

            Ok(TaskHandle::new(id, token, Some(self.control.clone())))
        })
    }

    fn wait(&self) {
        let mut state = self.shared.state.lock();
        while state.outstanding > 0 {
            self.shared.drained.wait(&mut state);
        }
    }

    fn caller(&self) -> Option<SharedCaller<R, K>> {
        self.shared.settings.read().caller.clone()
    }

    fn set_caller(&self, caller: SharedCaller<R, K>) {
        self.shared.settings.write().caller = Some(caller);
    }

    fn function(&self) -> Option<Function<R>> {
        self.shared.settings.read().function.clone()
    }

    fn set_function(&self, function: Function<R>) {
        self.shared.settings.write().function = Some(function);
    }

    fn param_spec(&self) -> Option<ParamSpec> {
        self.shared.settings.read().param_spec()
    }

    fn set_param_spec(&self, param_spec: ParamSpec) {
        self.shared.settings.write().set_param_spec(param_spec);
    }

    fn return_spec(&self) -> Option<ReturnSpec> {
        self.shared.settings.read().return_spec.clone()
    }

    fn set_return_spec(&self, return_spec: Option<ReturnSpec>) {
        self.shared.settings.write().return_spec = return_spec;
    }
}

impl<R, K> Drop for ThreadPoolInvoker<R, K> {
    fn drop(&mut self) {
        self.stop();
        let _ = self.control.send(Control::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Dispatcher panicked");
            }
        }
    }
}
