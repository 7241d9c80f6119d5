//! Driving a search strategy against an invoker.

use crate::{
    error::{Error, Result},
    function::Function,
    invoker::Invoker,
    params::{ParamSpec, ReturnSpec},
};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

/// A search strategy.
///
/// An optimizer installs itself (or a helper) as the invoker's caller, submits
/// candidates with [`Invoker::invoke`] and collects their outcomes. Once
/// `invoke` fails with [`Error::Stopped`] it should [`wait`](Invoker::wait)
/// for what is still in flight and return its best-so-far answer.
pub trait Optimizer<R, K> {
    type Output;

    /// Runs the search.
    ///
    /// # Errors
    ///
    /// Whatever configuration error the invoker reports.
    fn optimize(
        &mut self,
        invoker: &dyn Invoker<R, K>,
        param_spec: &ParamSpec,
        return_spec: Option<&ReturnSpec>,
    ) -> Result<Self::Output>;
}

/// Optimizes `function` with `optimizer`, using `invoker` to run it.
///
/// With a `timeout` the invoker is stopped once it elapses, which makes the
/// optimizer wrap up with what it has. The invoker is stopped when this
/// returns, whatever the outcome.
///
/// # Errors
///
/// - [`Error::NoParamSpec`] if `param_spec` is `None`; nothing is invoked.
/// - [`Error::WorkerSpawn`] if the timeout watchdog cannot be started.
/// - Whatever the optimizer returns.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(function, invoker, optimizer, return_spec))
)]
pub fn custom_optimize<R, K, I, O>(
    function: Function<R>,
    invoker: Arc<I>,
    optimizer: &mut O,
    param_spec: Option<ParamSpec>,
    return_spec: Option<ReturnSpec>,
    timeout: Option<Duration>,
) -> Result<O::Output>
where
    I: Invoker<R, K> + 'static,
    O: Optimizer<R, K>,
{
    let Some(param_spec) = param_spec else {
        invoker.stop();
        return Err(Error::NoParamSpec);
    };

    invoker.set_function(function);
    invoker.set_param_spec(param_spec.clone());
    invoker.set_return_spec(return_spec.clone());

    let outcome = timeout
        .map(|timeout| Watchdog::arm::<R, K, I>(Arc::clone(&invoker), timeout))
        .transpose()
        .and_then(|watchdog| {
            let outcome = optimizer.optimize(&*invoker, &param_spec, return_spec.as_ref());
            drop(watchdog);
            outcome
        });

    invoker.stop();

    #[cfg(feature = "tracing")]
    tracing::debug!("Optimization finished");

    outcome
}

/// Stops an invoker once a timeout elapses, unless disarmed first.
struct Watchdog {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn arm<R, K, I>(invoker: Arc<I>, timeout: Duration) -> Result<Self>
    where
        I: Invoker<R, K> + 'static,
    {
        let (disarm, armed) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("orges-timeout".to_owned())
            .spawn(move || {
                if armed.recv_timeout(timeout) == Err(RecvTimeoutError::Timeout) {
                    #[cfg(feature = "tracing")]
                    tracing::info!("Global timeout of {timeout:?} reached, stopping invoker");
                    invoker.stop();
                }
            })
            .map_err(|e| Error::WorkerSpawn {
                context: format!("Timeout watchdog: {e}"),
            })?;

        Ok(Self {
            disarm: Some(disarm),
            handle: Some(handle),
        })
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Disconnecting wakes the watchdog early.
        self.disarm.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
