use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use orges::{PoolConfig, WorkerCount};

/// Runtime configuration for the `orges` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file in the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "orges",
    version,
    about = "Grid search over a built-in test function on a thread pool invoker"
)]
pub struct CliArgs {
    /// Number of worker threads evaluating the test function, or `auto` for
    /// one per available CPU.
    ///
    /// Environment variable: `ORGES_WORKERS`
    #[arg(long, env = "ORGES_WORKERS", default_value = "auto")]
    pub workers: String,

    /// Global timeout for the whole search, in milliseconds.
    ///
    /// When it elapses the invoker stops accepting work and the best result
    /// found so far is reported.
    ///
    /// Environment variable: `ORGES_TIMEOUT_MS`
    #[arg(long, env = "ORGES_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Per-evaluation timeout, in milliseconds. Evaluations running longer are
    /// cancelled.
    ///
    /// Environment variable: `ORGES_TASK_TIMEOUT_MS`
    #[arg(long, env = "ORGES_TASK_TIMEOUT_MS")]
    pub task_timeout_ms: Option<u64>,

    /// Artificial duration of a single evaluation, in milliseconds.
    ///
    /// Environment variable: `ORGES_EVAL_DELAY_MS`
    #[arg(long, env = "ORGES_EVAL_DELAY_MS", default_value_t = 0)]
    pub eval_delay_ms: u64,

    /// Upper bound of the grid for `a` (the grid starts at 1).
    ///
    /// Environment variable: `ORGES_A_MAX`
    #[arg(long, env = "ORGES_A_MAX", default_value_t = 2)]
    pub a_max: i64,

    /// Upper bound of the grid for `b` (the grid starts at 1).
    ///
    /// Environment variable: `ORGES_B_MAX`
    #[arg(long, env = "ORGES_B_MAX", default_value_t = 2)]
    pub b_max: i64,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub workers: WorkerCount,
    pub timeout: Option<Duration>,
    pub task_timeout: Option<Duration>,
    pub eval_delay: Duration,
    pub a_max: i64,
    pub b_max: i64,
}

impl RunConfig {
    pub const fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.workers)
    }
}

impl TryFrom<CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let workers: WorkerCount = args.workers.parse()?;
        // Surface an unusable host concurrency now rather than at pool start.
        workers.resolve()?;

        if args.a_max < 1 || args.b_max < 1 {
            bail!(
                "ORGES_A_MAX ({}) and ORGES_B_MAX ({}) must be at least 1",
                args.a_max,
                args.b_max
            );
        }

        let timeout = positive_millis("ORGES_TIMEOUT_MS", args.timeout_ms)?;
        let task_timeout = positive_millis("ORGES_TASK_TIMEOUT_MS", args.task_timeout_ms)?;

        Ok(Self {
            workers,
            timeout,
            task_timeout,
            eval_delay: Duration::from_millis(args.eval_delay_ms),
            a_max: args.a_max,
            b_max: args.b_max,
        })
    }
}

fn positive_millis(name: &str, millis: Option<u64>) -> anyhow::Result<Option<Duration>> {
    match millis {
        Some(0) => bail!("{name} must be greater than 0"),
        millis => Ok(millis.map(Duration::from_millis)),
    }
}
