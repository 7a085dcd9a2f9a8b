//! Tracing subscriber and metric descriptions for host applications.

use std::sync::Once;

use metrics::{Unit, describe_counter};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::http::{
    METRIC_CACHE_BYPASS, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_STORE_ERROR,
};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("telemetry initialization failed: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
///
/// The filter comes from the settings alone; no environment variable is read.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .parse_lossy("");

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
        .map_err(|err| TelemetryError(format!("failed to install tracing subscriber: {err}")))
}

/// Register descriptions for the cache counters with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of GET requests answered from the response cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of GET requests forwarded because no fresh entry existed."
        );
        describe_counter!(
            METRIC_CACHE_BYPASS,
            Unit::Count,
            "Total number of non-GET requests passed through without cache access."
        );
        describe_counter!(
            METRIC_CACHE_STORE_ERROR,
            Unit::Count,
            "Total number of responses that could not be persisted to the cache."
        );
    });
}
