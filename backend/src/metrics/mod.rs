//! Process metrics registry (C2).
//!
//! A small façade over the `prometheus` crate: metrics are registered on
//! first use by name rather than declared as static fields (unlike the
//! idempotency metrics adapter this is grounded on), because the
//! components above it — the backend client in particular — mint a new
//! metric per normalised endpoint token at call time. The same registry
//! backs both a conventional Prometheus text-format scrape and this
//! core's own [`Metrics::export_json`] snapshot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde_json::{json, Value};
use thiserror::Error;

/// Error raised when registering or looking up a metric.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The underlying Prometheus registration failed.
    #[error("prometheus registration failed: {0}")]
    Registration(#[from] prometheus::Error),
    /// A metric with this name already exists as a different kind.
    #[error("metric '{0}' is already registered as a different kind")]
    KindMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Counter,
    Gauge,
    Histogram,
}

/// Process-wide registry of counters, gauges and histograms.
pub struct Metrics {
    registry: Registry,
    kinds: Mutex<HashMap<String, Kind>>,
    descriptions: Mutex<HashMap<String, String>>,
    counters: Mutex<HashMap<String, CounterVec>>,
    gauges: Mutex<HashMap<String, GaugeVec>>,
    histograms: Mutex<HashMap<String, HistogramVec>>,
}

impl Metrics {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            kinds: Mutex::new(HashMap::new()),
            descriptions: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying Prometheus registry, for wiring a scrape endpoint.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn remember_kind(&self, name: &str, desc: &str, kind: Kind) -> Result<(), MetricsError> {
        let mut kinds = self.kinds.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match kinds.get(name) {
            Some(existing) if *existing != kind => {
                return Err(MetricsError::KindMismatch(name.to_string()));
            }
            Some(_) => return Ok(()),
            None => {
                kinds.insert(name.to_string(), kind);
            }
        }
        self.descriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string(), desc.to_string());
        Ok(())
    }

    /// Get or create a named counter vector with the given label names.
    pub fn counter(
        &self,
        name: &str,
        description: &str,
        labels: &[&str],
    ) -> Result<CounterVec, MetricsError> {
        self.remember_kind(name, description, Kind::Counter)?;
        let mut counters = self.counters.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = counters.get(name) {
            return Ok(existing.clone());
        }
        let vec = CounterVec::new(Opts::new(name, description), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        counters.insert(name.to_string(), vec.clone());
        Ok(vec)
    }

    /// Get or create a named gauge vector with the given label names.
    pub fn gauge(
        &self,
        name: &str,
        description: &str,
        labels: &[&str],
    ) -> Result<GaugeVec, MetricsError> {
        self.remember_kind(name, description, Kind::Gauge)?;
        let mut gauges = self.gauges.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = gauges.get(name) {
            return Ok(existing.clone());
        }
        let vec = GaugeVec::new(Opts::new(name, description), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        gauges.insert(name.to_string(), vec.clone());
        Ok(vec)
    }

    /// Get or create a named histogram vector with the given label names.
    /// `buckets` defaults to the Prometheus client's standard buckets when
    /// `None`.
    pub fn histogram(
        &self,
        name: &str,
        description: &str,
        labels: &[&str],
        buckets: Option<Vec<f64>>,
    ) -> Result<HistogramVec, MetricsError> {
        self.remember_kind(name, description, Kind::Histogram)?;
        let mut histograms = self
            .histograms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = histograms.get(name) {
            return Ok(existing.clone());
        }
        let mut opts = HistogramOpts::new(name, description);
        if let Some(buckets) = buckets {
            opts = opts.buckets(buckets);
        }
        let vec = HistogramVec::new(opts, labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        histograms.insert(name.to_string(), vec.clone());
        Ok(vec)
    }

    /// Render every registered metric as the JSON shape this core's own
    /// observability facade consumes: `{timestamp, metrics:{name:{type,
    /// description, ...}}}`.
    #[must_use]
    pub fn export_json(&self) -> Value {
        let descriptions = self
            .descriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut metrics = serde_json::Map::new();

        for family in self.registry.gather() {
            let name = family.name().to_string();
            let description = descriptions
                .get(&name)
                .cloned()
                .unwrap_or_else(|| family.help().to_string());

            let entry = match family.get_field_type() {
                prometheus::proto::MetricType::COUNTER => {
                    let current: f64 = family
                        .get_metric()
                        .iter()
                        .map(|m| m.get_counter().value())
                        .sum();
                    json!({ "type": "counter", "description": description, "current": current })
                }
                prometheus::proto::MetricType::GAUGE => {
                    let current: f64 = family
                        .get_metric()
                        .iter()
                        .map(|m| m.get_gauge().value())
                        .sum();
                    json!({ "type": "gauge", "description": description, "current": current })
                }
                prometheus::proto::MetricType::HISTOGRAM => {
                    let values: Vec<Value> = family
                        .get_metric()
                        .iter()
                        .map(|m| {
                            let histogram = m.get_histogram();
                            json!({
                                "sample_count": histogram.get_sample_count(),
                                "sample_sum": histogram.get_sample_sum(),
                            })
                        })
                        .collect();
                    json!({ "type": "histogram", "description": description, "values": values })
                }
                _ => json!({ "type": "unknown", "description": description }),
            };
            metrics.insert(name, entry);
        }

        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "metrics": Value::Object(metrics),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII timer returned by histogram `.time()` usage at call sites; observes
/// elapsed seconds into the given histogram on drop.
pub struct Timer<'a> {
    histogram: &'a prometheus::Histogram,
    start: Instant,
}

impl<'a> Timer<'a> {
    /// Start timing against a bound histogram handle (the result of
    /// `histogram_vec.with_label_values(&[...])`).
    #[must_use]
    pub fn start(histogram: &'a prometheus::Histogram) -> Self {
        Self {
            histogram,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    #[expect(
        clippy::float_arithmetic,
        reason = "converting an elapsed Duration to seconds for a histogram observation"
    )]
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Normalise an endpoint path into a metric label token: strip the leading
/// slash and replace the remaining slashes with underscores, per §4.4.
#[must_use]
pub fn normalize_endpoint(path: &str) -> String {
    path.trim_start_matches('/').replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_reused_across_lookups_by_name() {
        let metrics = Metrics::new();
        let a = metrics.counter("hits_total", "hits", &["kind"]).expect("register");
        let b = metrics.counter("hits_total", "hits", &["kind"]).expect("register");
        a.with_label_values(&["l1"]).inc();
        assert_eq!(b.with_label_values(&["l1"]).get() as u64, 1);
    }

    #[test]
    fn registering_the_same_name_as_a_different_kind_errors() {
        let metrics = Metrics::new();
        metrics.counter("x", "x", &[]).expect("register counter");
        let err = metrics.gauge("x", "x", &[]).expect_err("kind mismatch");
        assert!(matches!(err, MetricsError::KindMismatch(_)));
    }

    #[test]
    fn export_json_reports_counter_values() {
        let metrics = Metrics::new();
        let counter = metrics.counter("req_total", "requests", &["status"]).expect("register");
        counter.with_label_values(&["200"]).inc();
        counter.with_label_values(&["200"]).inc();

        let exported = metrics.export_json();
        let current = exported["metrics"]["req_total"]["current"]
            .as_f64()
            .expect("current present");
        assert!((current - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn histogram_timer_observes_on_drop() {
        let metrics = Metrics::new();
        let histogram = metrics
            .histogram("latency_seconds", "latency", &["endpoint"], None)
            .expect("register");
        let bound = histogram.with_label_values(&["x"]);
        {
            let _timer = Timer::start(&bound);
        }
        assert_eq!(bound.get_sample_count(), 1);
    }

    #[test]
    fn normalize_endpoint_strips_leading_slash_and_joins_with_underscores() {
        assert_eq!(normalize_endpoint("/plan/job/123"), "plan_job_123");
        assert_eq!(normalize_endpoint("engine/info"), "engine_info");
    }
}
