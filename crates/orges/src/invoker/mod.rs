//! The invoker contract and its implementations.
//!
//! An [`Invoker`] applies a configured objective function to argument sets
//! submitted by a search strategy and reports each outcome back to the
//! strategy's [`Caller`](crate::Caller):
//!
//! - [`SimpleInvoker`] runs every task on the submitting thread.
//! - [`ThreadPoolInvoker`](crate::ThreadPoolInvoker) runs tasks on a pool of
//!   worker threads.
//! - [`PluggableInvoker`] wraps any invoker and runs [`InvocationPlugin`]s
//!   around it, e.g. [`TimeoutPlugin`].

mod handle;
mod pluggable;
mod plugins;
mod settings;
mod simple;

pub use handle::*;
pub use pluggable::*;
pub use plugins::*;
pub(crate) use settings::*;
pub use simple::*;

use crate::{
    args::Args,
    caller::SharedCaller,
    error::Result,
    function::Function,
    params::{ParamSpec, ReturnSpec},
    stoppable::Stoppable,
};
use std::sync::Arc;

/// Dispatches objective function applications and delivers their outcomes.
///
/// `R` is the function's return value, `K` the caller's correlation data.
///
/// Guarantees, for every implementation:
///
/// - Each task accepted by [`Invoker::invoke`] produces exactly one call to
///   `on_result` or `on_error` on the configured caller.
/// - Callbacks to a caller never overlap.
/// - After [`Stoppable::stop`], `invoke` fails with
///   [`Error::Stopped`](crate::Error::Stopped) while accepted tasks still
///   deliver, and [`Invoker::wait`] still returns once they have.
pub trait Invoker<R, K>: Stoppable + Send + Sync {
    /// Submits `fargs` for evaluation.
    ///
    /// Returns as soon as the task is dispatched, blocking first while no
    /// worker is free. `kwargs` comes back unchanged in the callback.
    ///
    /// # Errors
    ///
    /// - [`Error::Stopped`](crate::Error::Stopped) if the invoker is or
    ///   becomes stopped before the task is accepted.
    /// - A configuration error if the parameter specification, function or
    ///   caller is missing.
    fn invoke(&self, fargs: Args, kwargs: K) -> Result<TaskHandle>;

    /// Blocks until every accepted task has delivered its callback.
    ///
    /// Must not be called from inside a callback.
    fn wait(&self);

    fn caller(&self) -> Option<SharedCaller<R, K>>;

    /// Configures the caller receiving the outcomes of subsequent tasks.
    fn set_caller(&self, caller: SharedCaller<R, K>);

    fn function(&self) -> Option<Function<R>>;

    fn set_function(&self, function: Function<R>);

    fn param_spec(&self) -> Option<ParamSpec>;

    fn set_param_spec(&self, param_spec: ParamSpec);

    fn return_spec(&self) -> Option<ReturnSpec>;

    fn set_return_spec(&self, return_spec: Option<ReturnSpec>);
}

impl<R, K, I> Invoker<R, K> for Arc<I>
where
    I: Invoker<R, K> + ?Sized,
{
    fn invoke(&self, fargs: Args, kwargs: K) -> Result<TaskHandle> {
        (**self).invoke(fargs, kwargs)
    }

    fn wait(&self) {
        (**self).wait();
    }

    fn caller(&self) -> Option<SharedCaller<R, K>> {
        (**self).caller()
    }

    fn set_caller(&self, caller: SharedCaller<R, K>) {
        (**self).set_caller(caller);
    }

    fn function(&self) -> Option<Function<R>> {
        (**self).function()
    }

    fn set_function(&self, function: Function<R>) {
        (**self).set_function(function);
    }

    fn param_spec(&self) -> Option<ParamSpec> {
        (**self).param_spec()
    }

    fn set_param_spec(&self, param_spec: ParamSpec) {
        (**self).set_param_spec(param_spec);
    }

    fn return_spec(&self) -> Option<ReturnSpec> {
        (**self).return_spec()
    }

    fn set_return_spec(&self, return_spec: Option<ReturnSpec>) {
        (**self).set_return_spec(return_spec);
    }
}
