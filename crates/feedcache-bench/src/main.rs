//! feedcache-bench: fires sampling requests at a running server and reports
//! the latency each strategy measured for itself.

mod args;
mod client;
mod runner;
mod stats;


use std::time::Duration;

use clap::Parser;

use args::Cli;
use client::{BenchError, Ctx};

#[tokio::main]
async fn main() -> Result<(), BenchError> {
    let cli = Cli::parse();
    validate(&cli)?;

    let ctx = Ctx::new(&cli.base_url, Duration::from_secs(cli.timeout_seconds))?;
    let tasks = runner::plan(&cli);
    eprintln!("running {} requests against {}", tasks.len(), ctx.base);

    let outcome = runner::run(&ctx, tasks, cli.concurrency).await;

    for (task, err) in outcome.failures.iter().take(10) {
        eprintln!(
            "  {} feed={} count={}: {err}",
            task.strategy, task.feed, task.count
        );
    }
    if outcome.failures.len() > 10 {
        eprintln!("  ... {} more failures", outcome.failures.len() - 10);
    }

    println!(
        "{:<16} {:>6} {:>8} {:>10} {:>10} {:>10} {:>10}",
        "strategy", "count", "samples", "mean ms", "median ms", "p95 ms", "stdev ms"
    );
    for ((strategy, count), latencies) in &outcome.latencies {
        if let Some(summary) = stats::summarize(latencies) {
            println!(
                "{:<16} {:>6} {:>8} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
                strategy.as_str(),
                count,
                summary.samples,
                summary.mean,
                summary.median,
                summary.p95,
                summary.stdev
            );
        }
    }

    Ok(())
}

fn validate(cli: &Cli) -> Result<(), BenchError> {
    if cli.feeds.is_empty() {
        return Err(BenchError::InvalidInput("at least one --feed is required".into()));
    }
    if cli.counts.is_empty() || cli.strategies.is_empty() {
        return Err(BenchError::InvalidInput(
            "at least one --count and one --strategy are required".into(),
        ));
    }
    if cli.concurrency == 0 {
        return Err(BenchError::InvalidInput("--concurrency must be positive".into()));
    }
    Ok(())
}
