//! Observability hooks for migration passes.
//!
//! With the `metrics` feature, [`METRICS`] exposes Prometheus counters and a
//! duration histogram for applied and failed units. With the `tracing` feature,
//! [`tracing_helpers`] builds the spans the runner and executor enter.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{MigrationMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};

    pub static METRICS: Lazy<MigrationMetrics> = Lazy::new(MigrationMetrics::init);

    pub struct MigrationMetrics {
        registry: Registry,
        // Kept alive so the exporter keeps collecting.
        _provider: SdkMeterProvider,
        pub units_applied: Counter<u64>,
        pub units_failed: Counter<u64>,
        pub unit_duration: Histogram<f64>,
        pub passes_total: Counter<u64>,
    }

    impl MigrationMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder()
                    .with_reader(exporter)
                    .build(),
                Err(e) => {
                    log::warn!("Prometheus exporter unavailable, migration metrics disabled: {e}");
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("tidemark");

            let units_applied = meter
                .u64_counter("tidemark_units_applied_total")
                .with_description("Migration units applied and recorded")
                .build();

            let units_failed = meter
                .u64_counter("tidemark_units_failed_total")
                .with_description("Migration units whose apply or ledger write failed")
                .build();

            let unit_duration = meter
                .f64_histogram("tidemark_unit_duration_seconds")
                .with_description("Time spent applying a single migration unit")
                .build();

            let passes_total = meter
                .u64_counter("tidemark_passes_total")
                .with_description("Migration passes started")
                .build();

            Self {
                registry,
                _provider: provider,
                units_applied,
                units_failed,
                unit_duration,
                passes_total,
            }
        }

        pub fn record_pass(&self) {
            self.passes_total.add(1, &[]);
        }

        pub fn record_applied(&self, version: &str, elapsed: std::time::Duration) {
            let attrs = [KeyValue::new("version", version.to_string())];
            self.units_applied.add(1, &attrs);
            self.unit_duration.record(elapsed.as_secs_f64(), &attrs);
        }

        pub fn record_failed(&self, version: &str) {
            self.units_failed
                .add(1, &[KeyValue::new("version", version.to_string())]);
        }

        /// Render all collected metrics in the Prometheus text format
        pub fn render(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("Failed to encode migration metrics: {e}");
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Span covering one full migration pass
    pub fn migration_pass_span(pending: usize) -> Span {
        info_span!("tidemark.pass", pending)
    }

    /// Span covering one unit's apply and ledger write
    pub fn apply_unit_span(version: &str, name: &str) -> Span {
        info_span!("tidemark.unit", version, name)
    }

    /// Span covering a single statement round trip
    pub fn execute_statement_span(statement: &str) -> Span {
        let statement = statement.trim();
        let head = statement.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
        info_span!("tidemark.statement", statement = %head)
    }

    /// Span covering connection establishment
    pub fn connect_span() -> Span {
        info_span!("tidemark.connect")
    }

    /// Span covering advisory lock acquisition
    pub fn acquire_lock_span(key: i64) -> Span {
        info_span!("tidemark.lock", key)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::METRICS;
    use std::time::Duration;

    #[test]
    fn test_applied_unit_shows_up_in_render() {
        METRICS.record_pass();
        METRICS.record_applied("1.2.0", Duration::from_millis(15));
        METRICS.record_failed("1.3.0");

        let rendered = METRICS.render();
        assert!(rendered.contains("tidemark_units_applied_total"), "{rendered}");
        assert!(rendered.contains("tidemark_units_failed_total"), "{rendered}");
    }
}
