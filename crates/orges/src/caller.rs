use crate::{args::Args, error::TaskFailure};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receiver of task outcomes, implemented by search strategies.
///
/// An invoker never calls into the same caller concurrently: each callback
/// runs to completion before the next one starts, so implementations keep
/// their state in plain fields. Callbacks must return promptly and must not
/// call back into the invoker that delivers them.
pub trait Caller<R, K>: Send {
    /// A task produced `value` for `fargs`. `kwargs` is the correlation data
    /// given to `invoke`, unchanged.
    fn on_result(&mut self, value: R, fargs: Args, kwargs: K);

    /// A task failed with `error`.
    fn on_error(&mut self, error: TaskFailure, fargs: Args, kwargs: K);
}

/// How invokers hold their caller.
///
/// Delivery happens under this lock. A strategy keeps a typed `Arc` to its
/// own state and hands the invoker a coerced clone:
///
/// ```
/// use orges::{Args, Caller, Mutex, SharedCaller, TaskFailure};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Best(Option<f64>);
///
/// impl Caller<f64, ()> for Best {
///     fn on_result(&mut self, value: f64, _: Args, _: ()) {
///         self.0 = Some(self.0.map_or(value, |best| best.min(value)));
///     }
///     fn on_error(&mut self, _: TaskFailure, _: Args, _: ()) {}
/// }
///
/// let best = Arc::new(Mutex::new(Best::default()));
/// let shared: SharedCaller<f64, ()> = best.clone();
/// shared.lock().on_result(1.5, Args::new(), ());
/// assert_eq!(best.lock().0, Some(1.5));
/// ```
pub type SharedCaller<R, K> = Arc<Mutex<dyn Caller<R, K>>>;

/// Delivers one outcome to `caller`.
pub(crate) fn deliver<R, K>(
    caller: &SharedCaller<R, K>,
    outcome: Result<R, TaskFailure>,
    fargs: Args,
    kwargs: K,
) {
    let mut caller = caller.lock();
    match outcome {
        Ok(value) => caller.on_result(value, fargs, kwargs),
        Err(error) => caller.on_error(error, fargs, kwargs),
    }
}
