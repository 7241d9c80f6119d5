use super::{Invoker, Settings, TaskHandle};
use crate::{
    args::Args,
    caller::{SharedCaller, deliver},
    error::{Result, TaskFailure},
    function::Function,
    model::{Task, TaskId, WorkerId},
    params::{ParamSpec, ReturnSpec},
    pool::execute,
    stoppable::{Lifecycle, Stoppable},
};
use parking_lot::{Condvar, Mutex, RwLock};
use portable_atomic::{AtomicU64, Ordering};
use std::{panic, sync::Arc};
use tokio_util::sync::CancellationToken;

/// An invoker with a single worker: the thread calling
/// [`invoke`](Invoker::invoke).
///
/// The function runs and its callback is delivered before `invoke` returns,
/// so [`wait`](Invoker::wait) only has to cover invocations still running on
/// other threads. Cancelling the returned handle has no effect; the task is
/// already done.
pub struct SimpleInvoker<R, K> {
    settings: RwLock<Settings<R, K>>,
    lifecycle: Lifecycle,
    next_task: AtomicU64,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

impl<R, K> SimpleInvoker<R, K> {
    const WORKER: WorkerId = WorkerId::new(0);

    pub fn new() -> Self {
        Self {
            settings: RwLock::new(Settings::default()),
            lifecycle: Lifecycle::new(),
            next_task: AtomicU64::new(0),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn finish(&self) {
        let mut in_flight = self.in_flight.lock();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.drained.notify_all();
        }
    }
}

impl<R, K> Default for SimpleInvoker<R, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, K> Stoppable for SimpleInvoker<R, K> {
    fn stop(&self) {
        if self.lifecycle.stop() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Simple invoker stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.lifecycle.is_stopped()
    }
}

impl<R, K> Invoker<R, K> for SimpleInvoker<R, K>
where
    R: Send + 'static,
    K: Send + 'static,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    fn invoke(&self, fargs: Args, kwargs: K) -> Result<TaskHandle> {
        self.lifecycle.run(|| {
            let snapshot = self.settings.read().snapshot()?;
            let id = TaskId::new(self.next_task.fetch_add(1, Ordering::Relaxed));
            let token = CancellationToken::new();
            let task = Task {
                id,
                function: snapshot.function,
                args: Arc::new(fargs),
                params: snapshot.params,
                token: token.clone(),
            };

            *self.in_flight.lock() += 1;

            // `execute` already isolates the function's panics. Anything that
            // still unwinds here is treated like a dead worker.
            let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                execute(Self::WORKER, &task)
            }))
            .unwrap_or(Err(TaskFailure::WorkerLost {
                worker_id: Self::WORKER,
            }));

            let Task { args, .. } = task;
            let fargs = Arc::unwrap_or_clone(args);
            // A panicking caller must not leave the task counted as in flight.
            if panic::catch_unwind(panic::AssertUnwindSafe(|| {
                deliver(&snapshot.caller, outcome, fargs, kwargs);
            }))
            .is_err()
            {
                #[cfg(feature = "tracing")]
                tracing::error!("Caller panicked while handling an outcome");
            }
            self.finish();

            Ok(TaskHandle::new(id, token, None))
        })
    }

    fn wait(&self) {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.drained.wait(&mut in_flight);
        }
    }

    fn caller(&self) -> Option<SharedCaller<R, K>> {
        self.settings.read().caller.clone()
    }

    fn set_caller(&self, caller: SharedCaller<R, K>) {
        self.settings.write().caller = Some(caller);
    }

    fn function(&self) -> Option<Function<R>> {
        self.settings.read().function.clone()
    }

    fn set_function(&self, function: Function<R>) {
        self.settings.write().function = Some(function);
    }

    fn param_spec(&self) -> Option<ParamSpec> {
        self.settings.read().param_spec()
    }

    fn set_param_spec(&self, param_spec: ParamSpec) {
        self.settings.write().set_param_spec(param_spec);
    }

    fn return_spec(&self) -> Option<ReturnSpec> {
        self.settings.read().return_spec.clone()
    }

    fn set_return_spec(&self, return_spec: Option<ReturnSpec>) {
        self.settings.write().return_spec = return_spec;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Caller, Error};

    #[derive(Default)]
    struct Recorder {
        results: Vec<(i64, Args, u32)>,
        errors: Vec<(TaskFailure, u32)>,
    }

    impl Caller<i64, u32> for Recorder {
        fn on_result(&mut self, value: i64, fargs: Args, kwargs: u32) {
            self.results.push((value, fargs, kwargs));
        }

        fn on_error(&mut self, error: TaskFailure, _: Args, kwargs: u32) {
            self.errors.push((error, kwargs));
        }
    }

    fn configured() -> (SimpleInvoker<i64, u32>, Arc<Mutex<Recorder>>) {
        let invoker = SimpleInvoker::new();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        invoker.set_caller(recorder.clone());
        invoker.set_param_spec(ParamSpec::new().param("a").param("b"));
        invoker.set_function(Function::new(|args: &Args| {
            -(args.int("a").unwrap_or_default() + args.int("b").unwrap_or_default())
        }));
        (invoker, recorder)
    }

    #[test]
    fn delivers_before_invoke_returns() {
        let (invoker, recorder) = configured();
        let args = Args::new().with("a", 2).with("b", 1);

        let handle = invoker.invoke(args.clone(), 11).unwrap();
        assert_eq!(recorder.lock().results, vec![(-3, args, 11)]);
        assert_eq!(handle.id(), TaskId::new(0));

        invoker.wait();
    }

    #[test]
    fn panics_and_mismatched_args_become_errors() {
        let (invoker, recorder) = configured();

        invoker.invoke(Args::new().with("a", 1), 1).unwrap();

        invoker.set_function(Function::new(|_: &Args| -> i64 { panic!("boom") }));
        invoker
            .invoke(Args::new().with("a", 1).with("b", 1), 2)
            .unwrap();

        let recorder = recorder.lock();
        assert!(recorder.results.is_empty());
        assert!(matches!(
            recorder.errors[0],
            (TaskFailure::CallNotPossible { .. }, 1)
        ));
        assert_eq!(
            recorder.errors[1],
            (
                TaskFailure::Panicked {
                    message: "boom".into()
                },
                2
            )
        );
    }

    #[test]
    fn missing_configuration_fails_fast() {
        let invoker = SimpleInvoker::<i64, u32>::new();
        assert_eq!(invoker.invoke(Args::new(), 0).unwrap_err(), Error::NoParamSpec);

        invoker.set_param_spec(ParamSpec::new());
        assert_eq!(invoker.invoke(Args::new(), 0).unwrap_err(), Error::NoFunction);

        invoker.set_function(Function::new(|_: &Args| 0));
        assert_eq!(invoker.invoke(Args::new(), 0).unwrap_err(), Error::NoCaller);
    }

    #[test]
    fn stopped_invoker_rejects_without_callback() {
        let (invoker, recorder) = configured();
        invoker.stop();
        invoker.stop();

        let err = invoker
            .invoke(Args::new().with("a", 1).with("b", 1), 0)
            .unwrap_err();
        assert_eq!(err, Error::Stopped);
        assert!(recorder.lock().results.is_empty());
        assert!(recorder.lock().errors.is_empty());
        invoker.wait();
    }

    struct Grumpy {
        seen: usize,
    }

    impl Caller<i64, u32> for Grumpy {
        fn on_result(&mut self, _: i64, _: Args, _: u32) {
            self.seen += 1;
            panic!("caller failure");
        }

        fn on_error(&mut self, _: TaskFailure, _: Args, _: u32) {}
    }

    #[test]
    fn panicking_caller_does_not_block_wait() {
        let (invoker, _) = configured();
        let grumpy = Arc::new(Mutex::new(Grumpy { seen: 0 }));
        invoker.set_caller(grumpy.clone());

        for kwargs in 0..2 {
            invoker
                .invoke(Args::new().with("a", 1).with("b", 1), kwargs)
                .unwrap();
        }

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        std::thread::scope(|s| {
            s.spawn(|| {
                invoker.wait();
                let _ = done_tx.send(());
            });
            assert!(
                done_rx
                    .recv_timeout(std::time::Duration::from_secs(2))
                    .is_ok(),
                "wait() must return after a caller panic"
            );
        });
        assert_eq!(grumpy.lock().seen, 2);
    }
}
