//! Demo run of a grid search on the thread pool invoker.
//!
//! ## Structure
//!
//! - [`config`] - CLI arguments and their validation.
//! - [`grid`] - exhaustive grid search optimizer.
//! - [`telemetry`] - console logging.

pub mod config;
pub mod grid;
pub mod telemetry;

use config::RunConfig;
use core::time::Duration;
use grid::{GridSearch, Report};
use orges::{
    Args, Function, LoggingPlugin, ParamSpec, PluggableInvoker, ReturnSpec, TaskContext,
    TaskFailure, ThreadPoolInvoker, TimeoutPlugin, custom_optimize,
};
use std::{sync::Arc, thread::sleep};

/// The invoker stack used by the binary.
pub type RunInvoker = PluggableInvoker<f64, (), ThreadPoolInvoker<f64, ()>>;

/// Builds the pool and wraps it with the logging and timeout plugins.
pub fn build_invoker(config: &RunConfig) -> anyhow::Result<RunInvoker> {
    let pool = ThreadPoolInvoker::new(config.pool_config())?;
    let mut invoker = PluggableInvoker::new(pool).with_plugin(LoggingPlugin);
    if let Some(timeout) = config.task_timeout {
        invoker = invoker.with_plugin(TimeoutPlugin::new(timeout));
    }
    Ok(invoker)
}

/// Runs the grid search to completion, or until the invoker is stopped.
pub fn run_search(invoker: Arc<RunInvoker>, config: &RunConfig) -> anyhow::Result<Report> {
    let mut optimizer = GridSearch::new(vec![config.a_max, config.b_max]);
    let report = custom_optimize(
        test_function(config.eval_delay),
        invoker,
        &mut optimizer,
        Some(ParamSpec::new().param("a").param("b")),
        Some(ReturnSpec::minimize("fitness")),
        config.timeout,
    )?;
    Ok(report)
}

/// `-(a + b)`, taking `delay` to compute.
///
/// The delay is spent in short naps so that a cancelled evaluation returns
/// promptly.
pub fn test_function(delay: Duration) -> Function<f64> {
    const NAP: Duration = Duration::from_millis(5);

    Function::cancellable(move |args: &Args, ctx: &TaskContext<'_>| {
        let mut remaining = delay;
        while !remaining.is_zero() {
            if ctx.is_cancelled() {
                return Err(TaskFailure::Cancelled);
            }
            let nap = remaining.min(NAP);
            sleep(nap);
            remaining -= nap;
        }

        let a = args.int("a").ok_or_else(|| TaskFailure::failed("`a` is not an integer"))?;
        let b = args.int("b").ok_or_else(|| TaskFailure::failed("`b` is not an integer"))?;
        Ok(-(a + b) as f64)
    })
}
