//! Metrics recorder initialization and configuration.

use {
    anyhow::Result,
    metrics::{describe_counter, describe_gauge},
    tracing::info,
};

use crate::definitions::{realtime, websocket};

/// Handle to the metrics system, providing access to exported metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format.
    ///
    /// Returns an empty string when the `prometheus` feature is off.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.render()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Global labels to add to all metrics
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system.
///
/// Call once at startup. Without the `prometheus` feature, or with
/// `enabled: false`, no recorder is installed and the facade macros are
/// no-ops.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder fails to install.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        #[cfg(feature = "prometheus")]
        {
            let handle =
                metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder().handle();
            return Ok(MetricsHandle {
                prometheus_handle: handle,
            });
        }
        #[cfg(not(feature = "prometheus"))]
        {
            return Ok(MetricsHandle {});
        }
    }

    #[cfg(feature = "prometheus")]
    {
        let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        for (key, value) in config.global_labels {
            builder = builder.add_global_label(key, value);
        }
        let handle = builder.install_recorder()?;
        describe_all();
        info!("prometheus metrics recorder installed");
        Ok(MetricsHandle {
            prometheus_handle: handle,
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle {})
    }
}

/// Register help text for every rally metric with the installed recorder.
pub fn describe_all() {
    describe_counter!(
        realtime::SUBSCRIPTIONS_STARTED_TOTAL,
        "Subscription sessions started, including topic switches"
    );
    describe_gauge!(
        realtime::SUBSCRIPTIONS_ACTIVE,
        "Controllers currently holding a live subscription"
    );
    describe_counter!(
        realtime::RETRIES_SCHEDULED_TOTAL,
        "Retries scheduled after an error, completion, or setup failure"
    );
    describe_counter!(
        realtime::EVENTS_DELIVERED_TOTAL,
        "Events handed to a callback or the cache invalidation path"
    );
    describe_counter!(
        realtime::PAYLOAD_ERRORS_TOTAL,
        "Results that carried GraphQL errors"
    );
    describe_counter!(
        realtime::STALE_CALLBACKS_DROPPED_TOTAL,
        "Transport callbacks ignored because their session was superseded"
    );
    describe_counter!(
        realtime::DECODE_FAILURES_TOTAL,
        "Payloads that did not decode into an event"
    );
    describe_counter!(websocket::CONNECTIONS_TOTAL, "Acknowledged socket handshakes");
    describe_counter!(websocket::RECONNECTS_TOTAL, "Reconnect attempts after socket loss");
    describe_gauge!(
        websocket::OPERATIONS_ACTIVE,
        "Operations multiplexed over the socket"
    );
    describe_counter!(websocket::FRAMES_RECEIVED_TOTAL, "Frames received from the server");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn disabled_recorder_renders_nothing_useful() {
        let handle = init_metrics(MetricsRecorderConfig::default()).unwrap();
        let output = handle.render();
        assert!(output.is_empty() || output.starts_with('#'));
    }

    #[test]
    fn describing_without_recorder_is_a_noop() {
        describe_all();
    }
}
