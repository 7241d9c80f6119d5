use super::WorkRequest;
use crate::{
    error::TaskFailure,
    function::TaskContext,
    model::{Release, Start, Task, TaskError, TaskResult, WorkerId, WorkerMessage},
};
use core::any::Any;
use crossbeam_channel::{Receiver, Sender};
use std::{
    panic::{self, AssertUnwindSafe},
    thread,
};

/// Applies a task's function to its arguments.
///
/// Argument mismatches, errors and panics of the function all become a
/// [`TaskFailure`]. A task whose token was cancelled by the time the function
/// returns is reported as [`TaskFailure::Cancelled`], whatever it returned.
pub(crate) fn execute<R>(worker_id: WorkerId, task: &Task<R>) -> Result<R, TaskFailure> {
    task.params.check(&task.args)?;

    let ctx = TaskContext::new(task.id, worker_id, &task.token);
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
        task.function.call(&task.args, &ctx)
    })) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            // Dropping the payload runs user code and may itself panic; that
            // panic is not caught here.
            drop(payload);
            Err(TaskFailure::Panicked { message })
        }
    };

    if task.token.is_cancelled() {
        return Err(TaskFailure::Cancelled);
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Body of a worker thread.
///
/// Runs one task at a time until it receives [`WorkRequest::Shutdown`] or
/// its request channel closes. For every task it reports
/// `Start -> (Result | Error) -> Release`, skipping `Start` for tasks that
/// were cancelled before they could begin.
pub(super) fn worker_loop<R>(
    worker_id: WorkerId,
    requests: Receiver<WorkRequest<R>>,
    messages: Sender<WorkerMessage<R>>,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    let _guard = ExitGuard {
        worker_id,
        messages: messages.clone(),
    };

    while let Ok(request) = requests.recv() {
        match request {
            WorkRequest::Execute(task) => run(worker_id, task, &messages),
            WorkRequest::Shutdown => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

fn run<R>(worker_id: WorkerId, task: Task<R>, messages: &Sender<WorkerMessage<R>>) {
    let id = task.id;

    let outcome = if task.token.is_cancelled() {
        Err(TaskFailure::Cancelled)
    } else {
        report(
            messages,
            WorkerMessage::Start(Start {
                worker_id,
                task: id,
            }),
        );
        execute(worker_id, &task)
    };
    // Give the arguments back to the dispatcher before it needs them.
    drop(task);

    let message = match outcome {
        Ok(value) => WorkerMessage::Result(TaskResult {
            worker_id,
            task: id,
            value,
        }),
        Err(value) => WorkerMessage::Error(TaskError {
            worker_id,
            task: id,
            value,
        }),
    };
    report(messages, message);
    report(
        messages,
        WorkerMessage::Release(Release {
            worker_id,
            task: id,
        }),
    );
}

fn report<R>(messages: &Sender<WorkerMessage<R>>, message: WorkerMessage<R>) {
    // A closed channel means the dispatcher is gone and nobody is listening.
    if messages.send(message).is_err() {
        #[cfg(feature = "tracing")]
        tracing::trace!("Dispatcher gone, dropping worker message");
    }
}

/// Tells the dispatcher when a worker thread unwinds.
struct ExitGuard<R> {
    worker_id: WorkerId,
    messages: Sender<WorkerMessage<R>>,
}

impl<R> Drop for ExitGuard<R> {
    fn drop(&mut self) {
        if thread::panicking() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Worker {} is unwinding", self.worker_id);

            let _ = self.messages.send(WorkerMessage::Exited {
                worker_id: self.worker_id,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        args::Args,
        function::Function,
        model::TaskId,
        params::ParamSpec,
    };
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn task(function: Function<i64>, args: Args) -> Task<i64> {
        Task {
            id: TaskId::new(1),
            function,
            args: Arc::new(args),
            params: Arc::new(ParamSpec::new().param("a").param("b")),
            token: CancellationToken::new(),
        }
    }

    fn sum() -> Function<i64> {
        Function::new(|args: &Args| -(args.int("a").unwrap() + args.int("b").unwrap()))
    }

    #[test]
    fn execute_applies_the_function() {
        let task = task(sum(), Args::new().with("a", 1).with("b", 2));
        assert_eq!(execute(WorkerId::new(0), &task), Ok(-3));
    }

    #[test]
    fn execute_rejects_mismatched_arguments() {
        let task = task(sum(), Args::new().with("b", 2).with("a", 1));
        assert!(matches!(
            execute(WorkerId::new(0), &task),
            Err(TaskFailure::CallNotPossible { .. })
        ));
    }

    #[test]
    fn execute_captures_panics() {
        let task = task(
            Function::new(|_: &Args| -> i64 { panic!("bad {}", 42) }),
            Args::new().with("a", 1).with("b", 2),
        );
        assert_eq!(
            execute(WorkerId::new(0), &task),
            Err(TaskFailure::Panicked {
                message: "bad 42".into()
            })
        );
    }

    #[test]
    fn value_produced_after_cancellation_is_discarded() {
        let task = task(
            Function::cancellable(|_: &Args, ctx: &TaskContext<'_>| {
                ctx.token().cancel();
                Ok(5)
            }),
            Args::new().with("a", 1).with("b", 2),
        );
        assert_eq!(
            execute(WorkerId::new(0), &task),
            Err(TaskFailure::Cancelled)
        );
    }

    #[test]
    fn worker_reports_start_outcome_release_in_order() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let (msg_tx, msg_rx) = crossbeam_channel::unbounded();
        let worker_id = WorkerId::new(4);

        let handle = thread::spawn(move || worker_loop(worker_id, rx, msg_tx));

        tx.send(WorkRequest::Execute(task(
            sum(),
            Args::new().with("a", 2).with("b", 2),
        )))
        .unwrap();

        let cancelled = task(sum(), Args::new().with("a", 1).with("b", 1));
        cancelled.token.cancel();
        tx.send(WorkRequest::Execute(cancelled)).unwrap();
        tx.send(WorkRequest::Shutdown).unwrap();
        handle.join().unwrap();

        let messages: Vec<_> = msg_rx.try_iter().collect();
        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[0], WorkerMessage::Start(_)));
        assert!(matches!(
            messages[1],
            WorkerMessage::Result(TaskResult { value: -4, .. })
        ));
        assert!(matches!(messages[2], WorkerMessage::Release(_)));
        assert!(matches!(
            messages[3],
            WorkerMessage::Error(TaskError {
                value: TaskFailure::Cancelled,
                ..
            })
        ));
        assert!(matches!(messages[4], WorkerMessage::Release(_)));
        assert!(messages.iter().all(|m| m.worker_id() == worker_id));
    }
}
