#![doc = include_str!("../README.md")]

mod run;

use clap::Parser;
use orges::Stoppable;
use run::config::{CliArgs, RunConfig};
use run::grid::Report;
use run::telemetry::init_telemetry;
use run::{build_invoker, run_search};
use std::sync::Arc;
use tokio::signal;

// Using mimalloc for better performance under contention between the worker
// threads.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let invoker = Arc::new(build_invoker(&config)?);
    let mut search = {
        let invoker = Arc::clone(&invoker);
        let config = config.clone();
        tokio::task::spawn_blocking(move || run_search(invoker, &config))
    };

    let report = tokio::select! {
        joined = &mut search => joined??,
        () = shutdown_signal() => {
            tracing::info!("Stopping the search, waiting for running evaluations");
            invoker.stop();
            search.await??
        }
    };

    print_report(&report);
    Ok(())
}

fn log_startup_info(config: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting grid search with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting grid search over {}x{} points with {} workers",
            config.a_max,
            config.b_max,
            config.workers
        );
    }
}

fn print_report(report: &Report) {
    tracing::info!(
        "Evaluated {} points, {} failed",
        report.evaluated,
        report.failed
    );
    match &report.best {
        Some((value, args)) => println!("Best: {args} -> {value}"),
        None => println!("No successful evaluation"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl+C handler: {e}");
        // Without a handler the search runs to completion.
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C signal");
}
