use super::{Invoker, TaskHandle};
use crate::{
    args::Args,
    caller::{Caller, SharedCaller},
    error::{Result, TaskFailure},
    function::Function,
    params::{ParamSpec, ReturnSpec},
    stoppable::{Lifecycle, Stoppable},
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Cross-cutting behavior run around every invocation of a
/// [`PluggableInvoker`].
///
/// Hooks observe; they cannot alter arguments or outcomes. `on_result` and
/// `on_error` run on the delivering thread right before the real caller sees
/// the outcome, under the same serialization.
pub trait InvocationPlugin<R, K>: Send + Sync {
    /// Called once `invoke` has accepted a task.
    fn on_invoke(&self, _handle: &TaskHandle) {}

    fn on_result(&self, _value: &R, _fargs: &Args, _kwargs: &K) {}

    fn on_error(&self, _error: &TaskFailure, _fargs: &Args, _kwargs: &K) {}
}

type Plugins<R, K> = Vec<Arc<dyn InvocationPlugin<R, K>>>;

/// An invoker decorator.
///
/// Forwards every call to the wrapped invoker and installs itself as that
/// invoker's caller, relaying outcomes to the configured caller unchanged.
/// Without plugins it is observably identical to the invoker it wraps.
/// Decorators nest, and [`stop`](Stoppable::stop) propagates down the chain.
pub struct PluggableInvoker<R, K, I> {
    inner: I,
    plugins: Plugins<R, K>,
    caller: RwLock<Option<SharedCaller<R, K>>>,
    lifecycle: Lifecycle,
}

impl<R, K, I> PluggableInvoker<R, K, I>
where
    R: 'static,
    K: 'static,
    I: Invoker<R, K>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            plugins: Vec::new(),
            caller: RwLock::new(None),
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: impl InvocationPlugin<R, K> + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        let caller = self.caller.read().clone();
        if let Some(caller) = caller {
            self.install(caller);
        }
        self
    }

    pub const fn inner(&self) -> &I {
        &self.inner
    }

    fn install(&self, caller: SharedCaller<R, K>) {
        let relay = Relay {
            plugins: self.plugins.clone(),
            caller,
        };
        self.inner.set_caller(Arc::new(Mutex::new(relay)));
    }
}

impl<R, K, I: Stoppable> Stoppable for PluggableInvoker<R, K, I> {
    fn stop(&self) {
        self.lifecycle.stop();
        self.inner.stop();
    }

    fn is_stopped(&self) -> bool {
        self.lifecycle.is_stopped()
    }
}

impl<R, K, I> Invoker<R, K> for PluggableInvoker<R, K, I>
where
    R: 'static,
    K: 'static,
    I: Invoker<R, K>,
{
    fn invoke(&self, fargs: Args, kwargs: K) -> Result<TaskHandle> {
        self.lifecycle.run(|| {
            let handle = self.inner.invoke(fargs, kwargs)?;
            for plugin in &self.plugins {
                plugin.on_invoke(&handle);
            }
            Ok(handle)
        })
    }

    fn wait(&self) {
        self.inner.wait();
    }

    fn caller(&self) -> Option<SharedCaller<R, K>> {
        self.caller.read().clone()
    }

    fn set_caller(&self, caller: SharedCaller<R, K>) {
        *self.caller.write() = Some(Arc::clone(&caller));
        self.install(caller);
    }

    fn function(&self) -> Option<Function<R>> {
        self.inner.function()
    }

    fn set_function(&self, function: Function<R>) {
        self.inner.set_function(function);
    }

    fn param_spec(&self) -> Option<ParamSpec> {
        self.inner.param_spec()
    }

    fn set_param_spec(&self, param_spec: ParamSpec) {
        self.inner.set_param_spec(param_spec);
    }

    fn return_spec(&self) -> Option<ReturnSpec> {
        self.inner.return_spec()
    }

    fn set_return_spec(&self, return_spec: Option<ReturnSpec>) {
        self.inner.set_return_spec(return_spec);
    }
}

/// The caller a [`PluggableInvoker`] installs into the invoker it wraps.
struct Relay<R, K> {
    plugins: Plugins<R, K>,
    caller: SharedCaller<R, K>,
}

impl<R, K> Caller<R, K> for Relay<R, K> {
    fn on_result(&mut self, value: R, fargs: Args, kwargs: K) {
        for plugin in &self.plugins {
            plugin.on_result(&value, &fargs, &kwargs);
        }
        self.caller.lock().on_result(value, fargs, kwargs);
    }

    fn on_error(&mut self, error: TaskFailure, fargs: Args, kwargs: K) {
        for plugin in &self.plugins {
            plugin.on_error(&error, &fargs, &kwargs);
        }
        self.caller.lock().on_error(error, fargs, kwargs);
    }
}
