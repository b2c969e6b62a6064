//! Observability module — OpenTelemetry metrics.
//!
//! Log output uses `tracing` with the subscriber installed in `main`;
//! this module owns the OTLP meter provider behind a drop guard
//! ([`metrics::MetricsGuard`]) plus the council instruments.

pub mod metrics;
