//! OpenTelemetry metrics export module
//!
//! Exports probe run statistics and the system stats gathered by the
//! builtin probes to an OpenTelemetry Collector.
//!
//! All `record_*` helpers are no-ops until [`init_metrics`] succeeded with an
//! endpoint, so probes can call them unconditionally.

use anyhow::{Context, Result};
use log::info;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use std::sync::OnceLock;
use std::time::Duration;

/// Metric export interval in seconds
const METRIC_EXPORT_INTERVAL_SECS: u64 = 30;

/// Global metrics handle
static METRICS: OnceLock<MinutelyMetrics> = OnceLock::new();

/// Global MeterProvider for graceful shutdown
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Note: Do NOT add _total suffix to Counter names (Prometheus adds it automatically)
pub struct MinutelyMetrics {
    // Probe loop
    pub probe_runs: Counter<u64>,
    pub probe_failures: Counter<u64>,
    pub probe_duration_ms: Histogram<f64>,

    // System stats
    pub cpu_usage_percent: Gauge<f64>,
    pub memory_bytes: Gauge<u64>,
    pub load_average: Gauge<f64>,
    pub process_rss_bytes: Gauge<u64>,
    pub process_threads: Gauge<u64>,
}

impl MinutelyMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            probe_runs: meter
                .u64_counter("probe_runs")
                .with_description("Number of minutely probe invocations")
                .with_unit("runs")
                .build(),
            probe_failures: meter
                .u64_counter("probe_failures")
                .with_description("Number of minutely probe invocations that failed")
                .with_unit("runs")
                .build(),
            probe_duration_ms: meter
                .f64_histogram("probe_duration_ms")
                .with_description("Time spent in a single probe invocation")
                .with_unit("ms")
                .build(),

            cpu_usage_percent: meter
                .f64_gauge("cpu_usage_percent")
                .with_description("CPU time share over the last probe interval")
                .with_unit("%")
                .build(),
            memory_bytes: meter
                .u64_gauge("memory_bytes")
                .with_description("System memory")
                .with_unit("bytes")
                .build(),
            load_average: meter
                .f64_gauge("load_average")
                .with_description("System load average")
                .build(),
            process_rss_bytes: meter
                .u64_gauge("process_rss_bytes")
                .with_description("Resident set size of the agent process")
                .with_unit("bytes")
                .build(),
            process_threads: meter
                .u64_gauge("process_threads")
                .with_description("Number of threads in the agent process")
                .with_unit("threads")
                .build(),
        }
    }
}

/// Adds `http://` to endpoints given without a scheme. Empty means disabled.
fn normalize_endpoint(endpoint: Option<&str>) -> Option<String> {
    let endpoint = endpoint?.trim();
    if endpoint.is_empty() {
        return None;
    }

    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        Some(format!("http://{}", endpoint))
    } else {
        Some(endpoint.to_string())
    }
}

/// Initialize OpenTelemetry metrics provider
///
/// Configures metrics export to OTLP Collector via gRPC.
/// Skips initialization if no endpoint is configured.
pub fn init_metrics(endpoint: Option<&str>) -> Result<()> {
    let endpoint = match normalize_endpoint(endpoint) {
        Some(ep) => ep,
        None => {
            info!("OTEL_EXPORTER_OTLP_ENDPOINT not set. Metrics export disabled.");
            return Ok(());
        }
    };

    info!("Initializing OpenTelemetry metrics exporter");
    info!("OTLP endpoint: {}", endpoint);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create OTLP metric exporter")?;

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_interval(Duration::from_secs(METRIC_EXPORT_INTERVAL_SECS))
        .build();

    let resource = Resource::default().merge(&Resource::new(vec![
        KeyValue::new("service.name", "minutely"),
        KeyValue::new("telemetry.sdk.language", "rust"),
    ]));

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(provider.clone());
    let _ = METER_PROVIDER.set(provider);

    let meter = global::meter("minutely");

    let _registered_probes_gauge = meter
        .u64_observable_gauge("registered_probes")
        .with_description("Number of probes in the process-wide registry")
        .with_unit("probes")
        .with_callback(|observer| {
            observer.observe(crate::probes::registry().len() as u64, &[]);
        })
        .build();

    let _ = METRICS.set(MinutelyMetrics::new(&meter));

    info!("OpenTelemetry metrics initialized successfully");
    Ok(())
}

pub fn metrics() -> Option<&'static MinutelyMetrics> {
    METRICS.get()
}

pub fn record_probe_run(probe: &str, elapsed: Duration, success: bool) {
    if let Some(m) = metrics() {
        let attrs = [KeyValue::new("probe", probe.to_string())];
        m.probe_runs.add(1, &attrs);
        if !success {
            m.probe_failures.add(1, &attrs);
        }
        m.probe_duration_ms.record(elapsed.as_secs_f64() * 1000.0, &attrs);
    }
}

// === System stats helpers ===

pub fn record_cpu_usage(user: f64, system: f64, idle: f64) {
    if let Some(m) = metrics() {
        for (mode, value) in [("user", user), ("system", system), ("idle", idle)] {
            m.cpu_usage_percent.record(value, &[KeyValue::new("mode", mode)]);
        }
    }
}

pub fn record_memory(total: u64, available: Option<u64>, free: u64) {
    if let Some(m) = metrics() {
        m.memory_bytes.record(total, &[KeyValue::new("state", "total")]);
        m.memory_bytes.record(free, &[KeyValue::new("state", "free")]);
        if let Some(available) = available {
            m.memory_bytes.record(available, &[KeyValue::new("state", "available")]);
        }
    }
}

pub fn record_load_average(one: f32, five: f32, fifteen: f32) {
    if let Some(m) = metrics() {
        for (window, value) in [("1m", one), ("5m", five), ("15m", fifteen)] {
            m.load_average.record(f64::from(value), &[KeyValue::new("window", window)]);
        }
    }
}

pub fn record_process(rss_bytes: u64, threads: u64) {
    if let Some(m) = metrics() {
        m.process_rss_bytes.record(rss_bytes, &[]);
        m.process_threads.record(threads, &[]);
    }
}

/// Shutdown OpenTelemetry (graceful shutdown)
/// Flushes pending metrics and shuts down the MeterProvider
pub fn shutdown_metrics() {
    info!("Shutting down OpenTelemetry metrics...");
    if let Some(provider) = METER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            log::warn!("Failed to shutdown MeterProvider: {}", e);
        } else {
            info!("OpenTelemetry metrics shutdown complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_not_set() {
        assert!(normalize_endpoint(None).is_none());
    }

    #[test]
    fn test_normalize_endpoint_empty() {
        assert!(normalize_endpoint(Some("")).is_none());
        assert!(normalize_endpoint(Some("   ")).is_none());
    }

    #[test]
    fn test_normalize_endpoint_keeps_scheme() {
        assert_eq!(
            normalize_endpoint(Some("https://custom:4317")),
            Some("https://custom:4317".to_string())
        );
    }

    #[test]
    fn test_normalize_endpoint_adds_http_prefix() {
        assert_eq!(
            normalize_endpoint(Some("collector:4317")),
            Some("http://collector:4317".to_string())
        );
    }

    #[test]
    fn test_init_metrics_without_endpoint_is_noop() {
        init_metrics(None).unwrap();
        assert!(metrics().is_none());
    }

    #[test]
    fn test_record_helpers_without_metrics() {
        record_probe_run("noop", Duration::from_millis(3), false);
        record_cpu_usage(1.0, 2.0, 97.0);
        record_memory(1024, None, 512);
        record_load_average(0.5, 0.25, 0.1);
        record_process(4096, 2);
    }
}
