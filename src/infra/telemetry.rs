use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::refresh::{
    METRIC_DEGRADED, METRIC_TRIGGER_FAILED, METRIC_TRIGGER_TOTAL, METRIC_WAIT_MS,
};
use crate::cache::{METRIC_HIT, METRIC_MISS};
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
        describe_counter!(
            METRIC_TRIGGER_TOTAL,
            Unit::Count,
            "Ingestion workflow triggers attempted, labelled by mode (sync, async, manual)."
        );
        describe_counter!(
            METRIC_TRIGGER_FAILED,
            Unit::Count,
            "Ingestion workflow triggers that did not return a 2xx response."
        );
        describe_histogram!(
            METRIC_WAIT_MS,
            Unit::Milliseconds,
            "Time spent waiting for an execution to settle, labelled by outcome."
        );
        describe_counter!(
            METRIC_DEGRADED,
            Unit::Count,
            "Requests served without cache coordination because the execution store failed."
        );
        describe_counter!(
            METRIC_HIT,
            Unit::Count,
            "Search pages served from the in-process result cache."
        );
        describe_counter!(
            METRIC_MISS,
            Unit::Count,
            "Result cache lookups that found no fresh entry."
        );
    });
}
