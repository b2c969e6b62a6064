//! OpenTelemetry metrics for the deliberation pipeline.
//!
//! [`init`] installs an OTLP meter provider as the global provider and
//! registers the council instruments once. When metrics are disabled, or
//! the exporter cannot be built, the returned guard is inert and every
//! `record_*` helper is a no-op; the proxy keeps serving either way.

use std::sync::OnceLock;

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use tracing::{info, warn};

use crate::config::ObservabilityConfig;

static DELIBERATIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
static DELIBERATION_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
static PROVIDER_CALLS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
static MEMBER_TIMEOUTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
static GLOBAL_TIMEOUTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

/// Keeps the meter provider alive for the process lifetime; flushes and
/// shuts it down on drop. Hold it in `main` until exit.
pub struct MetricsGuard {
    provider: Option<SdkMeterProvider>,
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "Meter provider shutdown failed");
            }
        }
    }
}

/// Install the global meter provider and register the council
/// instruments.
///
/// Export runs on the periodic OTLP exporter (60 s default interval,
/// overridable via `OTEL_METRIC_EXPORT_INTERVAL` in milliseconds).
pub fn init(config: &ObservabilityConfig) -> MetricsGuard {
    if !config.enabled {
        return MetricsGuard { provider: None };
    }

    let exporter = match opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            warn!(error = %e, "OTLP metric exporter unavailable, metrics disabled");
            return MetricsGuard { provider: None };
        }
    };

    // Service identity is configuration-driven so every replica reports
    // under one service name while environments stay distinguishable.
    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new(
                "deployment.environment",
                config.deployment_environment.clone(),
            ),
        ])
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_periodic_exporter(exporter)
        .build();
    global::set_meter_provider(provider.clone());
    register_instruments();

    info!(endpoint = %config.otlp_endpoint, "Metrics exporting to OTLP collector");
    MetricsGuard {
        provider: Some(provider),
    }
}

fn register_instruments() {
    let meter = global::meter("cv-server");

    DELIBERATIONS_TOTAL.get_or_init(|| {
        meter
            .u64_counter("conclave_deliberations_total")
            .with_description("Total deliberation requests")
            .build()
    });

    DELIBERATION_DURATION_MS.get_or_init(|| {
        meter
            .f64_histogram("conclave_deliberation_duration_ms")
            .with_description("End-to-end deliberation latency in milliseconds")
            .with_unit("ms")
            .build()
    });

    PROVIDER_CALLS_TOTAL.get_or_init(|| {
        meter
            .u64_counter("conclave_provider_calls_total")
            .with_description("Total adapter calls through the provider pool")
            .build()
    });

    MEMBER_TIMEOUTS_TOTAL.get_or_init(|| {
        meter
            .u64_counter("conclave_member_timeouts_total")
            .with_description("Per-member deadline expiries")
            .build()
    });

    GLOBAL_TIMEOUTS_TOTAL.get_or_init(|| {
        meter
            .u64_counter("conclave_global_timeouts_total")
            .with_description("Requests recovered after the global deadline fired")
            .build()
    });
}

/// Record one finished deliberation.
pub fn record_deliberation(outcome: &'static str, duration_ms: f64, global_timeout_hit: bool) {
    if let Some(counter) = DELIBERATIONS_TOTAL.get() {
        counter.add(1, &[KeyValue::new("outcome", outcome)]);
    }
    if let Some(histogram) = DELIBERATION_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
    if global_timeout_hit {
        if let Some(counter) = GLOBAL_TIMEOUTS_TOTAL.get() {
            counter.add(1, &[]);
        }
    }
}

/// Record one adapter call outcome.
pub fn record_provider_call(provider_id: &str, success: bool) {
    let result = if success { "success" } else { "error" };
    if let Some(counter) = PROVIDER_CALLS_TOTAL.get() {
        counter.add(
            1,
            &[
                KeyValue::new("provider", provider_id.to_string()),
                KeyValue::new("result", result),
            ],
        );
    }
}

/// Record one per-member deadline expiry.
pub fn record_member_timeout(provider_id: &str) {
    if let Some(counter) = MEMBER_TIMEOUTS_TOTAL.get() {
        counter.add(1, &[KeyValue::new("provider", provider_id.to_string())]);
    }
}
