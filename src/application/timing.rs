//! Wall-time measurement for request paths.
//!
//! The shim only observes: it never retries, maps or swallows the wrapped
//! result.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use feedcache_api_types::CacheStatus;
use metrics::{counter, histogram};
use tracing::debug;

pub const METRIC_REQUEST_MS: &str = "feedcache_request_ms";
pub const METRIC_CACHE_HIT_TOTAL: &str = "feedcache_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "feedcache_cache_miss_total";

#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
    pub cache: CacheStatus,
}

impl<T> Timed<T> {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn was_hit(&self) -> bool {
        self.cache == CacheStatus::Hit
    }
}

/// Run `work`, timing it from before its first poll to its completion.
pub async fn observe<T, E, Fut>(route: &'static str, work: Fut) -> Result<Timed<T>, E>
where
    Fut: Future<Output = Result<(T, CacheStatus), E>>,
    E: Display,
{
    let started_at = Instant::now();
    let outcome = work.await;
    let elapsed = started_at.elapsed();
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

    match outcome {
        Ok((value, cache)) => {
            record(route, cache, elapsed_ms);
            debug!(
                target = "feedcache::timing",
                route,
                cache = cache.as_str(),
                elapsed_ms,
                "request path completed"
            );
            Ok(Timed {
                value,
                elapsed,
                cache,
            })
        }
        Err(err) => {
            debug!(
                target = "feedcache::timing",
                route,
                elapsed_ms,
                error = %err,
                "request path failed"
            );
            Err(err)
        }
    }
}

fn record(route: &'static str, cache: CacheStatus, elapsed_ms: f64) {
    histogram!(METRIC_REQUEST_MS, "route" => route, "cache" => cache.as_str()).record(elapsed_ms);
    match cache {
        CacheStatus::Hit => counter!(METRIC_CACHE_HIT_TOTAL, "route" => route).increment(1),
        CacheStatus::Miss => counter!(METRIC_CACHE_MISS_TOTAL, "route" => route).increment(1),
        CacheStatus::Uncached => {}
    }
}
