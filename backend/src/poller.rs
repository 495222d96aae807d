//! Proactive poller (C7): periodically snapshots the backend's current
//! plan into the metrics registry and the graph service's temporal store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, warn};

use crate::backend_client::{BackendClient, BackendClientError, ModelQuery};
use crate::config::PollerConfig;
use crate::graph::TemporalStore;
use crate::metrics::Metrics;

/// Snapshot computed by one polling iteration, applied atomically to the
/// metrics registry only once every fetch has succeeded — a cancelled
/// iteration therefore never leaves a partial mutation behind.
struct Snapshot {
    jobs_total: f64,
    jobs_failed: f64,
    workstations_offline: f64,
    job_states: Vec<(String, Value)>,
}

/// Periodically pulls a small snapshot of the current plan from the
/// backend and records it into metrics gauges and the temporal store.
pub struct Poller {
    client: Arc<BackendClient>,
    metrics: Arc<Metrics>,
    temporal: Arc<TemporalStore>,
    config: PollerConfig,
    consecutive_failures: AtomicU32,
    running: AtomicBool,
}

impl Poller {
    /// Construct a poller over shared collaborators.
    #[must_use]
    pub fn new(
        client: Arc<BackendClient>,
        metrics: Arc<Metrics>,
        temporal: Arc<TemporalStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            client,
            metrics,
            temporal,
            config,
            consecutive_failures: AtomicU32::new(0),
            running: AtomicBool::new(false),
        }
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot, BackendClientError> {
        let count_body = self.client.plan_job_count().await?;
        let issues_body = self.client.plan_job_issues().await?;
        let workstations_body = self.client.query_workstations(&ModelQuery::default()).await?;

        Ok(Snapshot {
            jobs_total: extract_count(&count_body),
            jobs_failed: extract_list(&issues_body).len() as f64,
            workstations_offline: count_offline(&workstations_body),
            job_states: extract_job_states(&issues_body),
        })
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) {
        let now = Utc::now();
        if let Ok(gauge) = self.metrics.gauge("tws_jobs_total", "Jobs in the current plan", &[]) {
            gauge.with_label_values(&[]).set(snapshot.jobs_total);
        }
        if let Ok(gauge) = self.metrics.gauge("tws_jobs_failed", "Failed jobs in the current plan", &[]) {
            gauge.with_label_values(&[]).set(snapshot.jobs_failed);
        }
        if let Ok(gauge) = self.metrics.gauge(
            "tws_workstations_offline",
            "Offline workstations in the current plan",
            &[],
        ) {
            gauge.with_label_values(&[]).set(snapshot.workstations_offline);
        }
        #[expect(clippy::cast_precision_loss, reason = "unix timestamps fit f64 for metrics purposes")]
        if let Ok(gauge) = self.metrics.gauge("tws_last_poll_timestamp", "Unix timestamp of the last successful poll", &[]) {
            gauge.with_label_values(&[]).set(now.timestamp() as f64);
        }

        for (job_id, state) in &snapshot.job_states {
            self.temporal.record(job_id, state.clone(), now, "poller");
        }
    }

    fn record_failure(&self) {
        if let Ok(counter) = self.metrics.counter("tws_poll_errors_total", "Consecutive backend poll failures", &[]) {
            counter.with_label_values(&[]).inc();
        }
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn backoff_delay(&self) -> std::time::Duration {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        if failures < self.config.failure_threshold {
            return self.config.polling_interval;
        }
        let extra = self.config.polling_interval.saturating_mul(failures - self.config.failure_threshold + 1);
        (self.config.polling_interval + extra).min(self.config.max_backoff)
    }

    /// Run one polling iteration: fetch, then apply. Cancel-safe — if the
    /// returned future is dropped mid-fetch, no metric or temporal-store
    /// mutation has happened yet.
    pub async fn poll_once(&self) {
        match self.fetch_snapshot().await {
            Ok(snapshot) => {
                self.apply_snapshot(&snapshot);
                self.record_success();
            }
            Err(err) => {
                warn!(error = %err, "backend poll failed");
                self.record_failure();
            }
        }
    }

    /// Run the polling loop forever, suspending only at `sleep` and the
    /// backend/temporal-store awaits inside [`poll_once`]. Returns
    /// immediately without polling if another instance is already running
    /// against this poller (single-instance guarantee, §4.7).
    pub async fn run_forever(self: Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            error!("poller already running against this backend client; refusing to start a second instance");
            return;
        }

        loop {
            self.poll_once().await;
            tokio::time::sleep(self.backoff_delay()).await;
        }
    }
}

fn extract_count(value: &Value) -> f64 {
    value
        .get("count")
        .or_else(|| value.as_u64().is_some().then_some(value))
        .and_then(Value::as_u64)
        .map_or(0.0, |count| {
            #[expect(clippy::cast_precision_loss, reason = "job counts are far below f64's exact integer range")]
            let as_f64 = count as f64;
            as_f64
        })
}

fn extract_list(value: &Value) -> Vec<Value> {
    value
        .get("items")
        .unwrap_or(value)
        .as_array()
        .cloned()
        .unwrap_or_default()
}

fn extract_job_states(value: &Value) -> Vec<(String, Value)> {
    extract_list(value)
        .into_iter()
        .filter_map(|entry| {
            let id = entry
                .get("id")
                .or_else(|| entry.get("jobId"))
                .or_else(|| entry.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)?;
            Some((id, entry))
        })
        .collect()
}

fn count_offline(value: &Value) -> f64 {
    let offline = extract_list(value)
        .iter()
        .filter(|workstation| {
            workstation
                .get("status")
                .and_then(Value::as_str)
                .map(|status| status.eq_ignore_ascii_case("offline"))
                .unwrap_or(false)
        })
        .count();
    #[expect(clippy::cast_precision_loss, reason = "workstation counts are far below f64's exact integer range")]
    let as_f64 = offline as f64;
    as_f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_client::BackendClientConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> PollerConfig {
        PollerConfig {
            polling_interval: Duration::from_secs(30),
            failure_threshold: 3,
            max_backoff: Duration::from_secs(300),
        }
    }

    async fn client_against(server: &MockServer) -> Arc<BackendClient> {
        let client_config = BackendClientConfig {
            base_url: server.uri(),
            username: "user".to_string(),
            password: "pass".to_string(),
            engine_name: None,
            engine_owner: None,
            trust_env: true,
            timeout: Duration::from_secs(5),
        };
        Arc::new(BackendClient::new(&client_config, Arc::new(Metrics::new())).expect("client"))
    }

    #[test]
    fn extract_count_reads_the_count_field() {
        assert!((extract_count(&json!({"count": 7})) - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn count_offline_matches_case_insensitively() {
        let value = json!([{"status": "OFFLINE"}, {"status": "online"}]);
        assert!((count_offline(&value) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn poll_once_records_metrics_and_temporal_events_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twsd/api/v2/plan/job/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 5})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/twsd/api/v2/plan/job/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "j1", "status": "FAILING"}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/twsd/api/v2/model/workstation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "w1", "status": "OFFLINE"}])))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let metrics = Arc::new(Metrics::new());
        let temporal = Arc::new(TemporalStore::new(Arc::clone(&metrics)));
        let poller = Poller::new(client, Arc::clone(&metrics), Arc::clone(&temporal), config());

        poller.poll_once().await;

        let exported = metrics.export_json();
        assert!((exported["metrics"]["tws_jobs_total"]["current"].as_f64().expect("present") - 5.0).abs() < f64::EPSILON);
        assert_eq!(poller.consecutive_failures.load(Ordering::Relaxed), 0);

        match temporal.status_at("j1", Utc::now()) {
            crate::graph::StatusAtTime::Observed(state) => assert_eq!(state["status"], "FAILING"),
            other => panic!("expected an observed state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_once_increments_the_failure_counter_on_error() {
        let server = MockServer::start().await;
        // No mocks registered: every request 404s.
        let client = client_against(&server).await;
        let metrics = Arc::new(Metrics::new());
        let temporal = Arc::new(TemporalStore::new(Arc::clone(&metrics)));
        let poller = Poller::new(client, metrics, temporal, config());

        poller.poll_once().await;
        assert_eq!(poller.consecutive_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn backoff_grows_once_the_failure_threshold_is_crossed() {
        let server = MockServer::start().await;
        let client = client_against(&server).await;
        let metrics = Arc::new(Metrics::new());
        let temporal = Arc::new(TemporalStore::new(Arc::clone(&metrics)));
        let poller = Poller::new(client, metrics, temporal, config());

        assert_eq!(poller.backoff_delay(), config().polling_interval);
        poller.consecutive_failures.store(5, Ordering::Relaxed);
        assert!(poller.backoff_delay() > config().polling_interval);
        assert!(poller.backoff_delay() <= config().max_backoff);
    }
}
