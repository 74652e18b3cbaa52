use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so subcommands can keep stdout for their JSON output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
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
        describe_counter!(
            "console_cache_invalidate_total",
            Unit::Count,
            "Total number of cache key invalidations issued, by source."
        );
        describe_counter!(
            "console_cache_event_unrouted_total",
            Unit::Count,
            "Total number of change events whose type routes to no group."
        );
        describe_gauge!(
            "console_cache_event_queue_len",
            Unit::Count,
            "Current number of pending change events in the queue."
        );
        describe_counter!(
            "console_cache_event_dropped_total",
            Unit::Count,
            "Total number of change events dropped due to queue overflow."
        );
        describe_counter!(
            "console_query_store_stale_total",
            Unit::Count,
            "Total number of query store entries marked stale."
        );
        describe_histogram!(
            "console_cache_consume_ms",
            Unit::Milliseconds,
            "Change-event consumption latency in milliseconds."
        );
    });
}
