use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};

use crate::args::{Cli, Strategy};
use crate::client::{BenchError, Ctx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub strategy: Strategy,
    pub feed: i64,
    pub count: u32,
}

/// Every strategy sees the same feed for a given request slot, so the
/// comparison is not skewed by feed size.
pub fn plan(cli: &Cli) -> Vec<Task> {
    let mut tasks =
        Vec::with_capacity(cli.counts.len() * cli.requests_per_count * cli.strategies.len());
    let mut slot = 0_usize;
    for &count in &cli.counts {
        for _ in 0..cli.requests_per_count {
            let feed = cli.feeds[slot % cli.feeds.len()];
            slot += 1;
            for &strategy in &cli.strategies {
                tasks.push(Task {
                    strategy,
                    feed,
                    count,
                });
            }
        }
    }
    tasks
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub latencies: BTreeMap<(Strategy, u32), Vec<f64>>,
    pub failures: Vec<(Task, BenchError)>,
}

pub async fn run(ctx: &Ctx, tasks: Vec<Task>, concurrency: usize) -> Outcome {
    let total = tasks.len();
    let mut outcome = Outcome::default();
    let mut finished = 0_usize;

    let mut results = stream::iter(tasks)
        .map(|task| async move {
            let result = ctx.took(task.strategy, task.feed, task.count).await;
            (task, result)
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((task, result)) = results.next().await {
        finished += 1;
        match result {
            Ok(took) => outcome
                .latencies
                .entry((task.strategy, task.count))
                .or_default()
                .push(took),
            Err(err) => outcome.failures.push((task, err)),
        }
        if finished % 500 == 0 || finished == total {
            eprintln!("  processed {finished}/{total} requests");
        }
    }

    outcome
}
