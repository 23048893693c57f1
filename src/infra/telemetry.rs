use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::{sampling, timing};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_histogram!(
            timing::METRIC_REQUEST_MS,
            Unit::Milliseconds,
            "Wall-clock latency of timed sampling and listing operations."
        );
        describe_counter!(
            timing::METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of timed operations answered from the cache."
        );
        describe_counter!(
            timing::METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of timed operations that fell through to the backing store."
        );
        describe_counter!(
            sampling::METRIC_CACHE_WRITE_FAILED_TOTAL,
            Unit::Count,
            "Total number of cache population writes that failed."
        );
        describe_counter!(
            sampling::METRIC_MEMBER_SLOT_DROPPED_TOTAL,
            Unit::Count,
            "Total number of sampled members dropped because their hash could not be read."
        );
    });
}
