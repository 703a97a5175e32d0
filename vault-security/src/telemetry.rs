//! Telemetry sink collaborator.
//!
//! Every C1-C7 component previously only logged via `tracing`; this
//! trait lets them additionally emit counters/gauges/histograms to a
//! pluggable sink without depending on `prometheus` directly. The
//! default `NullTelemetrySink` means the system "must continue to
//! operate if [the collaborator is] absent" () even when no
//! metrics backend is wired up.

use parking_lot::Mutex;
use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Registry};
use std::collections::HashMap;
use std::sync::Arc;

pub trait TelemetrySink: Send + Sync {
    fn counter(&self, name: &str, delta: u64);
    fn gauge(&self, name: &str, value: f64);
    fn histogram(&self, name: &str, value: f64);
}

/// No-op sink. Used when no metrics backend is configured.
#[derive(Debug, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn counter(&self, _name: &str, _delta: u64) {}
    fn gauge(&self, _name: &str, _value: f64) {}
    fn histogram(&self, _name: &str, _value: f64) {}
}

/// A `prometheus`-backed sink. Metrics are registered lazily on first
/// use and cached by name, since the set of metric names a running
/// system will emit is not known upfront.
pub struct PrometheusTelemetrySink {
    registry: Registry,
    counters: Mutex<HashMap<String, IntCounter>>,
    gauges: Mutex<HashMap<String, Gauge>>,
    histograms: Mutex<HashMap<String, Histogram>>,
}

impl PrometheusTelemetrySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(),
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        })
    }

    /// The underlying registry, for a deployment that wants to expose
    /// it over its own HTTP exporter (out of scope for this workspace).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl TelemetrySink for PrometheusTelemetrySink {
    fn counter(&self, name: &str, delta: u64) {
        let mut counters = self.counters.lock();
        let counter = counters.entry(name.to_string()).or_insert_with(|| {
            let counter = IntCounter::new(name, name).expect("valid metric name");
            let _ = self.registry.register(Box::new(counter.clone()));
            counter
        });
        counter.inc_by(delta);
    }

    fn gauge(&self, name: &str, value: f64) {
        let mut gauges = self.gauges.lock();
        let gauge = gauges.entry(name.to_string()).or_insert_with(|| {
            let gauge = Gauge::new(name, name).expect("valid metric name");
            let _ = self.registry.register(Box::new(gauge.clone()));
            gauge
        });
        gauge.set(value);
    }

    fn histogram(&self, name: &str, value: f64) {
        let mut histograms = self.histograms.lock();
        let histogram = histograms.entry(name.to_string()).or_insert_with(|| {
            let histogram = Histogram::with_opts(HistogramOpts::new(name, name))
                .expect("valid metric name");
            let _ = self.registry.register(Box::new(histogram.clone()));
            histogram
        });
        histogram.observe(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_all_calls_without_panicking() {
        let sink = NullTelemetrySink;
        sink.counter("decisions_total", 1);
        sink.gauge("pool_size", 5.0);
        sink.histogram("decision_latency_ms", 12.3);
    }

    #[test]
    fn prometheus_sink_records_and_reuses_metrics() {
        let sink = PrometheusTelemetrySink::new();
        sink.counter("requests_total", 1);
        sink.counter("requests_total", 2);
        sink.gauge("active_agents", 7.0);
        sink.histogram("latency_ms", 4.2);

        let families = sink.registry().gather();
        assert!(!families.is_empty());
    }
}
