//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Frames read from upstream
    UpstreamFrames,
    /// Upstream frames that failed to decode
    DecodeErrors,
    /// Price records derived from upstream frames
    RecordsExtracted,
    /// Frames queued to downstream clients
    Deliveries,
    /// Frames dropped because a client queue was full
    DroppedSends,
    /// Clients removed after a failed send
    SendFailures,
    /// Downstream messages forwarded upstream
    ForwardedMessages,
}

impl CounterMetric {
    pub fn name(self) -> &'static str {
        match self {
            CounterMetric::UpstreamFrames => "relay_upstream_frames_total",
            CounterMetric::DecodeErrors => "relay_upstream_decode_errors_total",
            CounterMetric::RecordsExtracted => "relay_records_extracted_total",
            CounterMetric::Deliveries => "relay_downstream_deliveries_total",
            CounterMetric::DroppedSends => "relay_downstream_dropped_total",
            CounterMetric::SendFailures => "relay_downstream_send_failures_total",
            CounterMetric::ForwardedMessages => "relay_forwarded_messages_total",
        }
    }
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Currently registered downstream clients
    ConnectedClients,
}

impl GaugeMetric {
    pub fn name(self) -> &'static str {
        match self {
            GaugeMetric::ConnectedClients => "relay_connected_clients",
        }
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    increment_by(metric, 1);
}

/// Increment a counter
pub fn increment_by(metric: CounterMetric, value: u64) {
    if value > 0 {
        metrics::counter!(metric.name()).increment(value);
    }
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Install the Prometheus exporter serving `/metrics` on the given port
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        let counters = [
            CounterMetric::UpstreamFrames,
            CounterMetric::DecodeErrors,
            CounterMetric::RecordsExtracted,
            CounterMetric::Deliveries,
            CounterMetric::DroppedSends,
            CounterMetric::SendFailures,
            CounterMetric::ForwardedMessages,
        ];
        for metric in counters {
            assert!(metric.name().starts_with("relay_"));
            assert!(metric.name().ends_with("_total"));
        }
        assert_eq!(GaugeMetric::ConnectedClients.name(), "relay_connected_clients");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        increment(CounterMetric::UpstreamFrames);
        increment_by(CounterMetric::Deliveries, 0);
        set_gauge(GaugeMetric::ConnectedClients, 2.0);
    }
}
