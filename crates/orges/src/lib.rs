#![doc = include_str!("../README.md")]

mod args;
mod caller;
mod error;
mod function;
mod invoker;
mod model;
mod optimize;
mod params;
mod pool;
mod stoppable;
mod worker_count;

pub use crate::args::*;
pub use crate::caller::*;
pub use crate::error::*;
pub use crate::function::*;
pub use crate::invoker::*;
pub use crate::model::*;
pub use crate::optimize::*;
pub use crate::params::*;
pub use crate::pool::*;
pub use crate::stoppable::*;
pub use crate::worker_count::*;

pub use parking_lot::{Mutex, MutexGuard};
pub use tokio_util::sync::CancellationToken;
