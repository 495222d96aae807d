//! Comprehensive health check orchestration (§4.8): runs every probe in
//! parallel under a global deadline, aggregates overall status, and
//! records the result into the bounded history ring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::config::HealthConfig;
use crate::metrics::Metrics;

use super::history::{HealthHistory, HealthHistoryEntry};
use super::probe::{
    ComponentHealth, HealthProbe, HealthStatus, CRITICAL_COMPONENTS,
};

/// Aggregate counts by status, for [`HealthCheckResult::summary`].
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StatusSummary {
    /// Count of HEALTHY components.
    pub healthy: usize,
    /// Count of DEGRADED components.
    pub degraded: usize,
    /// Count of UNHEALTHY components.
    pub unhealthy: usize,
    /// Count of UNKNOWN components.
    pub unknown: usize,
}

/// Result of [`HealthOrchestrator::perform_comprehensive_health_check`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthCheckResult {
    /// Aggregated status across every component.
    pub overall_status: HealthStatus,
    /// Per-component results, keyed by component name.
    pub components: HashMap<&'static str, ComponentHealth>,
    /// When this check completed.
    pub timestamp: chrono::DateTime<Utc>,
    /// A fresh correlation id for this check, for cross-referencing logs.
    pub correlation_id: String,
    /// Wall-clock duration of the whole check.
    pub duration_ms: u64,
    /// Status counts.
    pub summary: StatusSummary,
    /// One alert string per non-healthy component.
    pub alerts: Vec<String>,
}

fn aggregate_overall(components: &HashMap<&'static str, ComponentHealth>) -> (HealthStatus, StatusSummary) {
    let mut summary = StatusSummary::default();
    for component in components.values() {
        match component.status {
            HealthStatus::Healthy => summary.healthy += 1,
            HealthStatus::Degraded => summary.degraded += 1,
            HealthStatus::Unhealthy => summary.unhealthy += 1,
            HealthStatus::Unknown => summary.unknown += 1,
        }
    }

    let any_critical_unhealthy = CRITICAL_COMPONENTS.iter().any(|name| {
        components
            .get(name)
            .is_some_and(|c| c.status == HealthStatus::Unhealthy)
    });

    #[expect(
        clippy::cast_precision_loss,
        reason = "component counts are a handful of probes, never close to f64's exact-integer range"
    )]
    let total = components.len().max(1) as f64;
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "threshold ratios are inherently floating point; unhealthy counts are a handful of probes"
    )]
    let unhealthy_ratio = summary.unhealthy as f64 / total;
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "threshold ratios are inherently floating point; degraded counts are a handful of probes"
    )]
    let degraded_ratio = summary.degraded as f64 / total;

    let overall = if any_critical_unhealthy {
        HealthStatus::Unhealthy
    } else if unhealthy_ratio > 0.5 {
        HealthStatus::Unhealthy
    } else if summary.unhealthy > 0 || degraded_ratio > 0.3 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    (overall, summary)
}

fn build_alerts(components: &HashMap<&'static str, ComponentHealth>) -> Vec<String> {
    let mut alerts: Vec<String> = components
        .values()
        .filter(|c| c.status != HealthStatus::Healthy)
        .map(|c| {
            let level = match c.status {
                HealthStatus::Unhealthy => "CRITICAL",
                HealthStatus::Degraded => "WARNING",
                HealthStatus::Unknown | HealthStatus::Healthy => "INFO",
            };
            format!("{level}: {} is {:?} - {}", c.name, c.status, c.message)
        })
        .collect();
    alerts.sort();
    alerts
}

/// Runs the fixed set of component probes and aggregates their results.
pub struct HealthOrchestrator {
    probes: Vec<Arc<dyn HealthProbe>>,
    config: HealthConfig,
    history: HealthHistory,
}

impl HealthOrchestrator {
    /// Construct an orchestrator over a fixed probe set.
    #[must_use]
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>, config: HealthConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            probes,
            history: HealthHistory::new(config.max_history_entries, config.retention_days, metrics),
            config,
        }
    }

    /// Run every probe concurrently under `component_timeout`, aggregate,
    /// and record into history. The whole call is bounded by
    /// `overall_timeout`; probes still running at that point are reported
    /// as UNHEALTHY timeouts.
    pub async fn perform_comprehensive_health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let component_timeout = self.config.component_timeout;

        let probe_futures = self.probes.iter().map(|probe| {
            let name = probe.name();
            let probe = Arc::clone(probe);
            async move {
                let probe_start = Instant::now();
                match tokio::time::timeout(component_timeout, probe.check()).await {
                    Ok(health) => health,
                    Err(_) => ComponentHealth::timed_out(name, "unknown", probe_start.elapsed()),
                }
            }
        });

        let results = match tokio::time::timeout(self.config.overall_timeout, futures_util::future::join_all(probe_futures)).await {
            Ok(results) => results,
            Err(_) => self
                .probes
                .iter()
                .map(|probe| ComponentHealth::timed_out(probe.name(), "unknown", start.elapsed()))
                .collect(),
        };

        let components: HashMap<&'static str, ComponentHealth> =
            results.into_iter().map(|health| (health.name, health)).collect();

        let (overall_status, summary) = aggregate_overall(&components);
        let alerts = build_alerts(&components);
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let timestamp = Utc::now();

        self.history.push(HealthHistoryEntry {
            timestamp,
            overall_status,
            component_status_map: components.iter().map(|(name, health)| (*name, health.status)).collect(),
            duration_ms,
        });

        HealthCheckResult {
            overall_status,
            components,
            timestamp,
            correlation_id: Uuid::new_v4().to_string(),
            duration_ms,
            summary,
            alerts,
        }
    }

    /// Snapshot of the recorded history.
    #[must_use]
    pub fn history(&self) -> Vec<HealthHistoryEntry> {
        self.history.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::{HealthProbe, UnwiredProbe, DATABASE, REDIS};
    use async_trait::async_trait;

    struct HealthyProbe(&'static str);

    #[async_trait]
    impl HealthProbe for HealthyProbe {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn check(&self) -> ComponentHealth {
            ComponentHealth {
                name: self.0,
                kind: "test",
                status: HealthStatus::Healthy,
                message: "ok".to_string(),
                last_check: Utc::now(),
                response_time_ms: 1,
                error_count: 0,
                metadata: serde_json::Value::Null,
            }
        }
    }

    struct SlowProbe(&'static str);

    #[async_trait]
    impl HealthProbe for SlowProbe {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn check(&self) -> ComponentHealth {
            tokio::time::sleep(Duration::from_secs(10)).await;
            ComponentHealth {
                name: self.0,
                kind: "test",
                status: HealthStatus::Healthy,
                message: "ok".to_string(),
                last_check: Utc::now(),
                response_time_ms: 1,
                error_count: 0,
                metadata: serde_json::Value::Null,
            }
        }
    }

    fn config() -> HealthConfig {
        HealthConfig {
            component_timeout: Duration::from_millis(50),
            overall_timeout: Duration::from_millis(200),
            max_history_entries: 10,
            retention_days: 7,
            warning_threshold_percent: 85,
            critical_threshold_percent: 95,
            db_conn_warning_threshold_percent: 80,
        }
    }

    #[tokio::test]
    async fn all_healthy_probes_yield_overall_healthy() {
        let probes: Vec<Arc<dyn HealthProbe>> = vec![
            Arc::new(HealthyProbe("a")),
            Arc::new(HealthyProbe("b")),
        ];
        let orchestrator = HealthOrchestrator::new(probes, config(), Arc::new(Metrics::new()));
        let result = orchestrator.perform_comprehensive_health_check().await;
        assert_eq!(result.overall_status, HealthStatus::Healthy);
        assert_eq!(result.summary.healthy, 2);
        assert!(orchestrator.history().len() == 1);
    }

    #[tokio::test]
    async fn a_slow_probe_is_synthesized_as_unhealthy() {
        let probes: Vec<Arc<dyn HealthProbe>> = vec![Arc::new(SlowProbe("slow"))];
        let orchestrator = HealthOrchestrator::new(probes, config(), Arc::new(Metrics::new()));
        let result = orchestrator.perform_comprehensive_health_check().await;
        assert_eq!(result.components["slow"].status, HealthStatus::Unhealthy);
        assert_eq!(result.overall_status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn unhealthy_critical_component_forces_overall_unhealthy() {
        struct UnhealthyDatabase;
        #[async_trait]
        impl HealthProbe for UnhealthyDatabase {
            fn name(&self) -> &'static str {
                DATABASE
            }

            async fn check(&self) -> ComponentHealth {
                ComponentHealth {
                    name: DATABASE,
                    kind: "external",
                    status: HealthStatus::Unhealthy,
                    message: "down".to_string(),
                    last_check: Utc::now(),
                    response_time_ms: 1,
                    error_count: 1,
                    metadata: serde_json::Value::Null,
                }
            }
        }

        let probes: Vec<Arc<dyn HealthProbe>> = vec![
            Arc::new(UnhealthyDatabase),
            Arc::new(UnwiredProbe::new(REDIS)),
            Arc::new(HealthyProbe("c")),
        ];
        let orchestrator = HealthOrchestrator::new(probes, config(), Arc::new(Metrics::new()));
        let result = orchestrator.perform_comprehensive_health_check().await;
        assert_eq!(result.overall_status, HealthStatus::Unhealthy);
        assert!(result.alerts.iter().any(|a| a.contains(DATABASE)));
    }
}
