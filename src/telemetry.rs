//! Tracing subscriber installation and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
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
        .map_err(|err| TelemetryError(err.to_string()))
}

/// Register descriptions for every instrument this crate emits.
///
/// Safe to call more than once; only the first call registers.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scorta_cache_hit_total",
            Unit::Count,
            "Total number of cache hits, labeled by namespace."
        );
        describe_counter!(
            "scorta_cache_miss_total",
            Unit::Count,
            "Total number of cache misses, labeled by namespace."
        );
        describe_counter!(
            "scorta_cache_decode_failure_total",
            Unit::Count,
            "Total number of stored payloads that failed to decode and were served as misses."
        );
        describe_counter!(
            "scorta_cache_evicted_keys_total",
            Unit::Count,
            "Total number of keys removed by exact and pattern evictions."
        );
        describe_counter!(
            "scorta_cache_degraded_read_total",
            Unit::Count,
            "Total number of read-through loads that bypassed an unavailable cache."
        );
        describe_counter!(
            "scorta_cache_invalidation_total",
            Unit::Count,
            "Total number of invalidation fan-outs issued, labeled by entity."
        );
        describe_counter!(
            "scorta_cache_invalidation_failure_total",
            Unit::Count,
            "Total number of eviction targets that failed during a fan-out."
        );
        describe_histogram!(
            "scorta_cache_op_ms",
            Unit::Milliseconds,
            "Backing-store operation latency in milliseconds, labeled by operation."
        );
    });
}
