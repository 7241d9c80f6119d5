use super::{InvocationPlugin, TaskHandle};
use std::time::Duration;

/// Cancels every task that has not produced an outcome within a fixed time
/// after it was accepted.
///
/// The deadline travels with the task's handle and is enforced by the invoker
/// that issued it; a task that finishes first leaves nothing behind. Invokers
/// that run tasks inline, such as [`SimpleInvoker`](crate::SimpleInvoker),
/// finish before the deadline is armed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutPlugin {
    timeout: Duration,
}

impl TimeoutPlugin {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<R, K> InvocationPlugin<R, K> for TimeoutPlugin {
    fn on_invoke(&self, handle: &TaskHandle) {
        handle.cancel_after(self.timeout);
    }
}

#[cfg(feature = "tracing")]
pub use logging::LoggingPlugin;

#[cfg(feature = "tracing")]
mod logging {
    use crate::{
        args::Args,
        error::TaskFailure,
        invoker::{InvocationPlugin, TaskHandle},
    };
    use core::fmt;

    /// Logs every invocation and its outcome at `debug` level, and failures at
    /// `warn`.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct LoggingPlugin;

    impl<R: fmt::Debug, K> InvocationPlugin<R, K> for LoggingPlugin {
        fn on_invoke(&self, handle: &TaskHandle) {
            tracing::debug!(task = %handle.id(), "Invoked");
        }

        fn on_result(&self, value: &R, fargs: &Args, _: &K) {
            tracing::debug!("{fargs} -> {value:?}");
        }

        fn on_error(&self, error: &TaskFailure, fargs: &Args, _: &K) {
            tracing::warn!("{fargs} failed: {error}");
        }
    }
}
