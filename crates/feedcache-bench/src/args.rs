//! Command-line surface for `feedcache-bench`.

use std::fmt;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "feedcache-bench",
    version,
    about = "Compare feedcache sampling strategies by their reported latency",
    long_about = None
)]
pub struct Cli {
    /// Base URL of the sampling routes.
    #[arg(
        long,
        env = "FEEDCACHE_BENCH_BASE_URL",
        default_value = "http://localhost:3001/api/postgres"
    )]
    pub base_url: String,

    /// Feeds to sample, cycled across requests.
    #[arg(
        long = "feed",
        value_delimiter = ',',
        default_values_t = [1_i64, 2, 3, 4, 5, 6, 7, 8, 10, 99, 100]
    )]
    pub feeds: Vec<i64>,

    /// Sample sizes to request.
    #[arg(
        long = "count",
        value_delimiter = ',',
        default_values_t = [1_u32, 5, 10, 25, 50, 100, 200, 500, 1000]
    )]
    pub counts: Vec<u32>,

    /// Strategies to compare.
    #[arg(
        long = "strategy",
        value_enum,
        value_delimiter = ',',
        default_values_t = Strategy::ALL
    )]
    pub strategies: Vec<Strategy>,

    /// Requests per strategy and sample size.
    #[arg(long, default_value_t = 1000)]
    pub requests_per_count: usize,

    /// Requests in flight at once.
    #[arg(long, default_value_t = 20)]
    pub concurrency: usize,

    /// Per-request timeout.
    #[arg(long, default_value_t = 20)]
    pub timeout_seconds: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Strategy {
    /// Member-set sampling from Redis.
    Redis,
    /// Database-side random ordering.
    Postgres,
    /// Cached full feed shuffled per request.
    PostgresCached,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Redis, Strategy::Postgres, Strategy::PostgresCached];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Redis => "redis",
            Strategy::Postgres => "postgres",
            Strategy::PostgresCached => "postgres-cached",
        }
    }

    /// Route segment under the base URL.
    pub fn route(self) -> &'static str {
        match self {
            Strategy::Redis => "random-redis-items",
            Strategy::Postgres => "random-items",
            Strategy::PostgresCached => "random-items-cached",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
