//! Deriving the number of workers a pool should run.

use crate::error::{Error, Result};
use core::{fmt, num::NonZeroUsize, str::FromStr};

/// Determines the number of worker threads for a pool.
///
/// - `None` asks for the host's concurrency. Detection never fails: a host
///   that reports nothing usable gets a single worker.
/// - `Some(n)` must be positive and is returned as is.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] for zero or negative requests. They are
/// rejected rather than clamped.
pub fn determine_worker_count(request: Option<i64>) -> Result<usize> {
    let Some(request) = request else {
        return Ok(num_cpus::get().max(1));
    };

    if request <= 0 {
        return Err(Error::InvalidRequest {
            reason: format!("Worker count must be greater than 0, got {request}"),
        });
    }

    usize::try_from(request).map_err(|_| Error::InvalidRequest {
        reason: format!("Worker count {request} does not fit this platform"),
    })
}

/// A worker count request as it appears in configuration.
///
/// Parses from `"auto"` (host concurrency) or a positive integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkerCount {
    #[default]
    Auto,
    Fixed(NonZeroUsize),
}

impl WorkerCount {
    /// Resolves the request into a concrete count.
    ///
    /// # Errors
    ///
    /// See [`determine_worker_count`].
    pub fn resolve(self) -> Result<usize> {
        match self {
            Self::Auto => determine_worker_count(None),
            Self::Fixed(n) => i64::try_from(n.get())
                .map_err(|_| Error::InvalidRequest {
                    reason: format!("Worker count {n} is too large"),
                })
                .and_then(|n| determine_worker_count(Some(n))),
        }
    }
}

impl FromStr for WorkerCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }

        let request: i64 = s.parse().map_err(|_| Error::InvalidRequest {
            reason: format!("Worker count must be an integer or `auto`, got `{s}`"),
        })?;
        let count = determine_worker_count(Some(request))?;

        NonZeroUsize::new(count)
            .map(Self::Fixed)
            .ok_or_else(|| Error::InvalidRequest {
                reason: "Worker count must be greater than 0".to_string(),
            })
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

impl From<NonZeroUsize> for WorkerCount {
    fn from(n: NonZeroUsize) -> Self {
        Self::Fixed(n)
    }
}
