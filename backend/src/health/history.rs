//! Bounded, age-aware history of comprehensive health checks (§4.8, §3).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::metrics::Metrics;

use super::probe::HealthStatus;

/// Name of the counter incremented whenever an entry is dropped from the
/// bounded ring, by capacity or by age (SPEC_FULL.md §9: "enforce those
/// bounds and emit a metric on eviction").
const EVICTIONS_METRIC: &str = "health_history_evictions_total";

/// One entry in the health-check history ring.
#[derive(Debug, Clone)]
pub struct HealthHistoryEntry {
    /// When the check completed.
    pub timestamp: DateTime<Utc>,
    /// The overall status computed for this check.
    pub overall_status: HealthStatus,
    /// Per-component status at the time of this check.
    pub component_status_map: HashMap<&'static str, HealthStatus>,
    /// How long the comprehensive check took.
    pub duration_ms: u64,
}

/// Bounded ring of [`HealthHistoryEntry`], additionally aged out by
/// `retention_days`.
pub struct HealthHistory {
    entries: Mutex<VecDeque<HealthHistoryEntry>>,
    max_entries: usize,
    retention: Duration,
    metrics: Arc<Metrics>,
}

impl HealthHistory {
    /// Construct an empty history with the given bounds.
    #[must_use]
    pub fn new(max_entries: usize, retention_days: u32, metrics: Arc<Metrics>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries,
            retention: Duration::days(i64::from(retention_days)),
            metrics,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HealthHistoryEntry>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record_evictions(&self, count: usize) {
        if count == 0 {
            return;
        }
        if let Ok(counter) = self.metrics.counter(
            EVICTIONS_METRIC,
            "Health history ring entries dropped by capacity or age",
            &[],
        ) {
            #[expect(
                clippy::cast_precision_loss,
                reason = "eviction counts per push are a handful of entries, never close to f64's exact-integer range"
            )]
            let as_f64 = count as f64;
            counter.with_label_values(&[]).inc_by(as_f64);
        }
    }

    /// Append an entry, evicting the oldest when the ring is full, and age
    /// out anything past `retention_days`.
    pub fn push(&self, entry: HealthHistoryEntry) {
        let mut entries = self.lock();
        let cutoff = entry.timestamp - self.retention;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        let aged_out = before - entries.len();

        let capacity_evicted = if entries.len() >= self.max_entries {
            entries.pop_front();
            1
        } else {
            0
        };
        entries.push_back(entry);
        drop(entries);

        self.record_evictions(aged_out + capacity_evicted);
    }

    /// Snapshot of the current history, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HealthHistoryEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Number of entries currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` if no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: DateTime<Utc>) -> HealthHistoryEntry {
        HealthHistoryEntry {
            timestamp,
            overall_status: HealthStatus::Healthy,
            component_status_map: HashMap::new(),
            duration_ms: 1,
        }
    }

    #[test]
    fn ring_evicts_the_oldest_entry_once_full() {
        let metrics = Arc::new(Metrics::new());
        let history = HealthHistory::new(2, 7, Arc::clone(&metrics));
        let base = Utc::now();
        history.push(entry(base));
        history.push(entry(base + Duration::seconds(1)));
        history.push(entry(base + Duration::seconds(2)));

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].timestamp, base + Duration::seconds(1));

        let exported = metrics.export_json();
        let evictions = exported["metrics"]["health_history_evictions_total"]["current"]
            .as_f64()
            .expect("eviction counter recorded");
        assert!((evictions - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn entries_older_than_retention_are_aged_out() {
        let history = HealthHistory::new(100, 7, Arc::new(Metrics::new()));
        let base = Utc::now();
        history.push(entry(base - Duration::days(10)));
        history.push(entry(base));

        assert_eq!(history.len(), 1);
    }
}
