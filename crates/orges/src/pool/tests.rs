use super::*;
use crate::{
    Args, Caller, Error, Function, Invoker, ParamSpec, Stoppable, TaskContext, TaskFailure,
    WorkerCount,
};
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    num::NonZeroUsize,
    panic,
    sync::Arc,
    thread::{scope, sleep},
    time::{Duration, Instant},
};

#[derive(Default)]
struct Recorder {
    results: Vec<(i64, Args, usize)>,
    errors: Vec<(TaskFailure, usize)>,
    intervals: Vec<(Instant, Instant)>,
}

impl Recorder {
    fn enter(&mut self) -> Instant {
        let entered = Instant::now();
        // Long enough for an overlapping delivery to show up.
        sleep(Duration::from_micros(200));
        entered
    }

    fn delivered(&self) -> usize {
        self.results.len() + self.errors.len()
    }
}

impl Caller<i64, usize> for Recorder {
    fn on_result(&mut self, value: i64, fargs: Args, kwargs: usize) {
        let entered = self.enter();
        self.results.push((value, fargs, kwargs));
        self.intervals.push((entered, Instant::now()));
    }

    fn on_error(&mut self, error: TaskFailure, _: Args, kwargs: usize) {
        let entered = self.enter();
        self.errors.push((error, kwargs));
        self.intervals.push((entered, Instant::now()));
    }
}

fn config(workers: usize) -> PoolConfig {
    PoolConfig::new(WorkerCount::Fixed(NonZeroUsize::new(workers).unwrap()))
}

fn pool_with(config: PoolConfig) -> (ThreadPoolInvoker<i64, usize>, Arc<Mutex<Recorder>>) {
    let invoker = ThreadPoolInvoker::new(config).unwrap();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    invoker.set_caller(recorder.clone());
    invoker.set_param_spec(ParamSpec::new().param("a").param("b"));
    invoker.set_function(negated_sum(Duration::ZERO));
    (invoker, recorder)
}

fn pool(workers: usize) -> (ThreadPoolInvoker<i64, usize>, Arc<Mutex<Recorder>>) {
    pool_with(config(workers))
}

fn negated_sum(delay: Duration) -> Function<i64> {
    Function::new(move |args: &Args| {
        sleep(delay);
        -(args.int("a").unwrap() + args.int("b").unwrap())
    })
}

fn pair(a: i64, b: i64) -> Args {
    Args::new().with("a", a).with("b", b)
}

#[test]
fn ten_tasks_on_two_workers_all_deliver() {
    let (invoker, recorder) = pool(2);
    invoker.set_function(negated_sum(Duration::from_millis(5)));
    assert_eq!(invoker.workers(), 2);

    for i in 0..10 {
        let a = (i % 2) as i64 + 1;
        let b = ((i / 2) % 2) as i64 + 1;
        invoker.invoke(pair(a, b), i).unwrap();
    }
    invoker.wait();

    let recorder = recorder.lock();
    assert!(recorder.errors.is_empty());
    assert_eq!(recorder.results.len(), 10);
    for (value, fargs, _) in &recorder.results {
        assert_eq!(*value, -(fargs.int("a").unwrap() + fargs.int("b").unwrap()));
    }
    let kwargs: BTreeSet<_> = recorder.results.iter().map(|(_, _, k)| *k).collect();
    assert_eq!(kwargs, (0..10).collect());
}

#[test]
fn callbacks_never_overlap() {
    const SUBMITTERS: usize = 2;
    const PER_SUBMITTER: usize = 100;

    let (invoker, recorder) = pool(4);

    scope(|s| {
        for submitter in 0..SUBMITTERS {
            let invoker = &invoker;
            s.spawn(move || {
                for i in 0..PER_SUBMITTER {
                    let kwargs = submitter * PER_SUBMITTER + i;
                    invoker.invoke(pair(i as i64, 1), kwargs).unwrap();
                }
            });
        }
    });
    invoker.wait();

    let recorder = recorder.lock();
    assert_eq!(recorder.delivered(), SUBMITTERS * PER_SUBMITTER);

    let kwargs: BTreeSet<_> = recorder.results.iter().map(|(_, _, k)| *k).collect();
    assert_eq!(kwargs.len(), SUBMITTERS * PER_SUBMITTER);

    let mut intervals = recorder.intervals.clone();
    intervals.sort();
    for window in intervals.windows(2) {
        assert!(window[0].1 <= window[1].0, "callbacks overlapped");
    }
}

#[test]
fn stop_rejects_new_work_but_drains_accepted_tasks() {
    let (invoker, recorder) = pool(3);
    invoker.set_function(negated_sum(Duration::from_millis(50)));

    for i in 0..3 {
        invoker.invoke(pair(1, 1), i).unwrap();
    }
    invoker.stop();
    invoker.stop();

    assert!(invoker.is_stopped());
    assert_eq!(invoker.invoke(pair(1, 1), 3).unwrap_err(), Error::Stopped);

    invoker.wait();
    let recorder = recorder.lock();
    assert_eq!(recorder.results.len(), 3);
    assert!(recorder.results.iter().all(|(_, _, k)| *k < 3));
}

#[test]
fn stop_wakes_an_invoke_blocked_on_capacity() {
    let (invoker, recorder) = pool(1);
    invoker.set_function(negated_sum(Duration::from_millis(200)));
    invoker.invoke(pair(1, 2), 0).unwrap();

    let blocked = scope(|s| {
        let blocked = s.spawn(|| invoker.invoke(pair(2, 2), 1));
        sleep(Duration::from_millis(20));
        invoker.stop();
        blocked.join().unwrap()
    });

    assert_eq!(blocked.unwrap_err(), Error::Stopped);
    invoker.wait();
    assert_eq!(recorder.lock().results.len(), 1);
}

#[test]
fn wait_returns_at_once_when_nothing_is_outstanding() {
    let (invoker, _) = pool(1);
    let started = Instant::now();
    invoker.wait();
    invoker.wait();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn function_failures_are_delivered_as_errors() {
    let (invoker, recorder) = pool(2);

    invoker.invoke(Args::new().with("a", 1), 0).unwrap();
    invoker.wait();

    invoker.set_function(Function::new(|_: &Args| -> i64 { panic!("objective blew up") }));
    invoker.invoke(pair(1, 1), 1).unwrap();
    invoker.wait();

    invoker.set_function(Function::fallible(|_: &Args| Err("no convergence")));
    invoker.invoke(pair(1, 1), 2).unwrap();
    invoker.wait();

    let recorder = recorder.lock();
    assert!(recorder.results.is_empty());
    assert!(matches!(
        recorder.errors[0],
        (TaskFailure::CallNotPossible { .. }, 0)
    ));
    assert_eq!(
        recorder.errors[1],
        (
            TaskFailure::Panicked {
                message: "objective blew up".into()
            },
            1
        )
    );
    assert_eq!(
        recorder.errors[2],
        (
            TaskFailure::Failed {
                message: "no convergence".into()
            },
            2
        )
    );
    assert_eq!(invoker.workers(), 2);
}

#[test]
fn cooperative_cancellation_reports_cancelled() {
    let (invoker, recorder) = pool(1);
    invoker.set_function(Function::cancellable(|_: &Args, ctx: &TaskContext<'_>| {
        let started = Instant::now();
        while !ctx.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
            sleep(Duration::from_millis(1));
        }
        Ok(0)
    }));

    let handle = invoker.invoke(pair(1, 1), 7).unwrap();
    sleep(Duration::from_millis(20));
    handle.cancel();
    assert!(handle.is_cancelled());
    invoker.wait();

    assert_eq!(recorder.lock().errors, vec![(TaskFailure::Cancelled, 7)]);
    assert!(recorder.lock().results.is_empty());

    // Cancelling a finished task is harmless.
    handle.cancel();
    assert_eq!(invoker.workers(), 1);
}

#[test]
fn unresponsive_worker_is_reaped_and_replaced() {
    let (invoker, recorder) =
        pool_with(config(1).with_cancel_grace(Duration::from_millis(20)));
    invoker.set_function(negated_sum(Duration::from_millis(800)));

    let started = Instant::now();
    let handle = invoker.invoke(pair(1, 1), 0).unwrap();
    sleep(Duration::from_millis(10));
    handle.cancel();
    invoker.wait();

    assert!(started.elapsed() < Duration::from_millis(600));
    assert_eq!(recorder.lock().errors, vec![(TaskFailure::Cancelled, 0)]);

    invoker.set_function(negated_sum(Duration::ZERO));
    invoker.invoke(pair(2, 3), 1).unwrap();
    invoker.wait();

    assert_eq!(recorder.lock().results, vec![(-5, pair(2, 3), 1)]);
    assert_eq!(invoker.workers(), 1);
}

#[test]
fn deadlines_cancel_slow_tasks_only() {
    let (invoker, recorder) =
        pool_with(config(2).with_cancel_grace(Duration::from_millis(20)));
    invoker.set_function(Function::new(|args: &Args| {
        sleep(Duration::from_millis(args.int("a").unwrap() as u64));
        0
    }));

    invoker
        .invoke(pair(1, 0), 0)
        .unwrap()
        .cancel_after(Duration::from_millis(300));
    invoker
        .invoke(pair(500, 0), 1)
        .unwrap()
        .cancel_after(Duration::from_millis(30));
    invoker.wait();

    let recorder = recorder.lock();
    assert_eq!(recorder.results.len(), 1);
    assert_eq!(recorder.results[0].2, 0);
    assert_eq!(recorder.errors, vec![(TaskFailure::Cancelled, 1)]);
}

#[test]
fn dead_worker_is_reported_and_replaced() {
    struct Bomb;

    impl Drop for Bomb {
        fn drop(&mut self) {
            panic!("payload exploded on drop");
        }
    }

    let (invoker, recorder) = pool(1);
    invoker.set_function(Function::new(|_: &Args| -> i64 { panic::panic_any(Bomb) }));

    invoker.invoke(pair(1, 1), 0).unwrap();
    invoker.wait();

    let lost = recorder.lock().errors.clone();
    assert_eq!(lost.len(), 1);
    assert!(matches!(lost[0], (TaskFailure::WorkerLost { .. }, 0)));

    invoker.set_function(negated_sum(Duration::ZERO));
    invoker.invoke(pair(1, 1), 1).unwrap();
    invoker.wait();

    assert_eq!(recorder.lock().results, vec![(-2, pair(1, 1), 1)]);
    assert_eq!(invoker.workers(), 1);
}

#[test]
fn missing_caller_is_a_configuration_error() {
    let invoker = ThreadPoolInvoker::<i64, usize>::new(config(1)).unwrap();
    invoker.set_param_spec(ParamSpec::new());
    invoker.set_function(Function::new(|_: &Args| 0));

    assert_eq!(invoker.invoke(Args::new(), 0).unwrap_err(), Error::NoCaller);
    invoker.wait();
}

#[test]
fn dropping_a_busy_pool_does_not_hang() {
    let (invoker, _) = pool(2);
    invoker.set_function(negated_sum(Duration::from_millis(50)));
    invoker.invoke(pair(1, 1), 0).unwrap();

    let started = Instant::now();
    drop(invoker);
    assert!(started.elapsed() < Duration::from_secs(1));
}
