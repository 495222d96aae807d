//! Temporal state-at-time query (§4.6 point 1, §8 property 7).
//!
//! Every observed job state is appended to a per-job, time-ordered,
//! bounded ring. `record_job_state` and the query functions are append-only
//! and read-only respectively; nothing here ever mutates a past event.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::metrics::Metrics;

/// Maximum events retained per job before the oldest is evicted.
const MAX_EVENTS_PER_JOB: usize = 500;

/// Name of the counter incremented whenever an event is dropped from a
/// per-job ring for exceeding `MAX_EVENTS_PER_JOB` (SPEC_FULL.md §9:
/// "enforce those bounds and emit a metric on eviction").
const EVICTIONS_METRIC: &str = "temporal_store_evictions_total";

/// One observed state for a job at a point in time.
#[derive(Debug, Clone)]
pub struct TemporalEvent {
    /// The job this observation is about.
    pub job_id: String,
    /// Opaque state payload as reported by the source (typically the
    /// backend's plan/job status document).
    pub state_snapshot: Value,
    /// When the state was observed.
    pub observed_at: DateTime<Utc>,
    /// Where the observation came from (e.g. `"poller"`, `"manual"`).
    pub source: String,
}

/// Sentinel returned by [`TemporalStore::status_at`] when a job has no
/// observation at or before the queried time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus {
    /// Always `"no-prior-observation"`, per §4.6 point 1.
    pub reason: &'static str,
}

/// Either a past observation or the [`UnknownStatus`] sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusAtTime {
    /// The job's state as of its latest observation at or before the query time.
    Observed(Value),
    /// No event exists at or before the query time.
    Unknown(UnknownStatus),
}

/// Append-only, bounded-ring store of job state observations, shared by
/// the graph service's temporal query and the proactive poller that feeds it.
pub struct TemporalStore {
    events: Mutex<HashMap<String, VecDeque<TemporalEvent>>>,
    metrics: Arc<Metrics>,
}

impl TemporalStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<TemporalEvent>>> {
        self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record_eviction(&self) {
        if let Ok(counter) = self.metrics.counter(
            EVICTIONS_METRIC,
            "Temporal store events dropped for exceeding the per-job ring size",
            &[],
        ) {
            counter.with_label_values(&[]).inc();
        }
    }

    /// Append an observation, evicting the oldest event for this job if the
    /// per-job ring is full.
    pub fn record(&self, job_id: &str, state: Value, observed_at: DateTime<Utc>, source: &str) {
        let mut events = self.lock();
        let ring = events.entry(job_id.to_string()).or_default();
        let evicted = if ring.len() >= MAX_EVENTS_PER_JOB {
            ring.pop_front();
            true
        } else {
            false
        };
        ring.push_back(TemporalEvent {
            job_id: job_id.to_string(),
            state_snapshot: state,
            observed_at,
            source: source.to_string(),
        });
        drop(events);

        if evicted {
            self.record_eviction();
        }
    }

    /// The state whose `observed_at` is the greatest timestamp `<= at`, or
    /// [`StatusAtTime::Unknown`] when no such event exists.
    #[must_use]
    pub fn status_at(&self, job_id: &str, at: DateTime<Utc>) -> StatusAtTime {
        let events = self.lock();
        let Some(ring) = events.get(job_id) else {
            return StatusAtTime::Unknown(UnknownStatus {
                reason: "no-prior-observation",
            });
        };
        ring.iter()
            .filter(|event| event.observed_at <= at)
            .max_by_key(|event| event.observed_at)
            .map(|event| StatusAtTime::Observed(event.state_snapshot.clone()))
            .unwrap_or(StatusAtTime::Unknown(UnknownStatus {
                reason: "no-prior-observation",
            }))
    }

    /// Scan this job's ring in time order for the earliest transition from
    /// a non-failing to a failing state, at or after `since`.
    #[must_use]
    pub fn when_did_job_start_failing(&self, job_id: &str, since: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let events = self.lock();
        let ring = events.get(job_id)?;
        let mut ordered: Vec<&TemporalEvent> = ring.iter().collect();
        ordered.sort_by_key(|event| event.observed_at);

        let mut previous_failing = false;
        for event in ordered {
            let failing = is_failing(&event.state_snapshot);
            if event.observed_at >= since && failing && !previous_failing {
                return Some(event.observed_at);
            }
            previous_failing = failing;
        }
        None
    }
}

/// Tolerant check for a "failing" status in an opaque state document: looks
/// for a top-level `status` field matching `FAILING`/`FAILED` case-insensitively.
fn is_failing(state: &Value) -> bool {
    state
        .get("status")
        .and_then(Value::as_str)
        .map(|status| {
            let upper = status.to_ascii_uppercase();
            upper == "FAILING" || upper == "FAILED"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).expect("valid timestamp")
    }

    #[test]
    fn status_at_returns_the_most_recent_event_at_or_before_the_query_time() {
        let store = TemporalStore::new(Arc::new(Metrics::new()));
        store.record("j1", json!({"status": "HEALTHY"}), at(100), "poller");
        store.record("j1", json!({"status": "FAILING"}), at(200), "poller");

        assert_eq!(
            store.status_at("j1", at(150)),
            StatusAtTime::Observed(json!({"status": "HEALTHY"}))
        );
    }

    #[test]
    fn status_at_is_unknown_before_the_first_observation() {
        let store = TemporalStore::new(Arc::new(Metrics::new()));
        store.record("j1", json!({"status": "HEALTHY"}), at(100), "poller");
        assert_eq!(
            store.status_at("j1", at(50)),
            StatusAtTime::Unknown(UnknownStatus {
                reason: "no-prior-observation"
            })
        );
    }

    #[test]
    fn when_did_job_start_failing_finds_the_first_transition() {
        let store = TemporalStore::new(Arc::new(Metrics::new()));
        store.record("j1", json!({"status": "HEALTHY"}), at(100), "poller");
        store.record("j1", json!({"status": "FAILING"}), at(200), "poller");
        store.record("j1", json!({"status": "HEALTHY"}), at(300), "poller");
        store.record("j1", json!({"status": "FAILING"}), at(400), "poller");

        assert_eq!(store.when_did_job_start_failing("j1", at(0)), Some(at(200)));
        assert_eq!(store.when_did_job_start_failing("j1", at(250)), Some(at(400)));
    }

    #[test]
    fn ring_evicts_the_oldest_event_once_full() {
        let metrics = Arc::new(Metrics::new());
        let store = TemporalStore::new(Arc::clone(&metrics));
        let base = at(0);
        for i in 0..(MAX_EVENTS_PER_JOB + 10) {
            let ts = base + Duration::seconds(i64::try_from(i).expect("fits"));
            store.record("j1", json!({"status": "HEALTHY"}), ts, "poller");
        }
        let events = store.lock();
        assert_eq!(events.get("j1").expect("job tracked").len(), MAX_EVENTS_PER_JOB);
        drop(events);

        let exported = metrics.export_json();
        let evictions = exported["metrics"]["temporal_store_evictions_total"]["current"]
            .as_f64()
            .expect("eviction counter recorded");
        assert!((evictions - 10.0).abs() < f64::EPSILON);
    }
}
