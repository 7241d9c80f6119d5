//! Running/stopped lifecycle shared by every long-lived coordinator.

use crate::error::{Error, Result};
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A coordinator that can be told to stop accepting new work.
///
/// Stopping is one-way and idempotent. Work accepted before the stop is still
/// driven to completion; only operations entered afterwards fail.
pub trait Stoppable {
    /// Transitions to the stopped state. Further calls are no-ops.
    fn stop(&self);

    fn is_stopped(&self) -> bool;

    /// Entry check for stoppable operations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] once [`Stoppable::stop`] has been called.
    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            Err(Error::Stopped)
        } else {
            Ok(())
        }
    }
}

/// The two-state lifecycle flag embedded in coordinators.
#[derive(Debug, Default)]
pub struct Lifecycle {
    stopped: AtomicBool,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
        }
    }

    /// Stops the lifecycle and reports whether this call made the transition.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Runs `op` only while the lifecycle is running.
    ///
    /// The state is checked once, at entry. A stop that happens while `op` runs
    /// does not interrupt it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if stopped at entry, otherwise whatever `op`
    /// returns.
    pub fn run<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.is_stopped() {
            return Err(Error::Stopped);
        }
        op()
    }
}

impl Stoppable for Lifecycle {
    fn stop(&self) {
        Lifecycle::stop(self);
    }

    fn is_stopped(&self) -> bool {
        Lifecycle::is_stopped(self)
    }
}

impl<S: Stoppable + ?Sized> Stoppable for Arc<S> {
    fn stop(&self) {
        (**self).stop();
    }

    fn is_stopped(&self) -> bool {
        (**self).is_stopped()
    }
}
