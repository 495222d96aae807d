//! Health probes (§4.8): one `HealthProbe` implementation per component.
//!
//! Components this core owns (`cache_hierarchy`, `file_system`, `memory`,
//! `cpu`, `tws_monitor`, `connection_pools`) get a real probe. Components
//! that live in external collaborators this spec does not define
//! (`database`, `redis`, `websocket_pool`) get a pluggable slot defaulting
//! to [`HealthStatus::Unknown`], so the orchestrator can be rewired once
//! those collaborators exist.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::backend_client::BackendClient;
use crate::cache::CacheHierarchy;
use crate::config::HealthConfig;

/// Names of the nine fixed probes run by [`super::orchestrator`].
pub const DATABASE: &str = "database";
/// See [`DATABASE`].
pub const REDIS: &str = "redis";
/// See [`DATABASE`].
pub const CACHE_HIERARCHY: &str = "cache_hierarchy";
/// See [`DATABASE`].
pub const FILE_SYSTEM: &str = "file_system";
/// See [`DATABASE`].
pub const MEMORY: &str = "memory";
/// See [`DATABASE`].
pub const CPU: &str = "cpu";
/// See [`DATABASE`].
pub const TWS_MONITOR: &str = "tws_monitor";
/// See [`DATABASE`].
pub const CONNECTION_POOLS: &str = "connection_pools";
/// See [`DATABASE`].
pub const WEBSOCKET_POOL: &str = "websocket_pool";

/// Critical components: if either is UNHEALTHY, overall status is
/// UNHEALTHY regardless of the other rules (§4.8).
pub const CRITICAL_COMPONENTS: [&str; 2] = [DATABASE, REDIS];

/// Health status of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Operating with reduced capacity or elevated error rate.
    Degraded,
    /// Not operating, or failing its probe.
    Unhealthy,
    /// No probe is wired for this component.
    Unknown,
}

/// Result of probing one component.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentHealth {
    /// Component name, one of the constants above.
    pub name: &'static str,
    /// A short category label (`"storage"`, `"resource"`, `"external"`, ...).
    pub kind: &'static str,
    /// Health status.
    pub status: HealthStatus,
    /// Human-readable detail.
    pub message: String,
    /// When this probe ran.
    pub last_check: DateTime<Utc>,
    /// How long the probe took.
    pub response_time_ms: u64,
    /// Errors observed while probing (0 or 1 for most probes).
    pub error_count: u32,
    /// Probe-specific structured detail.
    pub metadata: Value,
}

impl ComponentHealth {
    fn unknown(name: &'static str, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            kind,
            status: HealthStatus::Unknown,
            message: message.into(),
            last_check: Utc::now(),
            response_time_ms: 0,
            error_count: 0,
            metadata: Value::Null,
        }
    }

    /// Synthesize a timeout/panic result for a probe that didn't complete
    /// in time (§4.8: "on probe timeout or exception").
    #[must_use]
    pub fn timed_out(name: &'static str, kind: &'static str, elapsed: Duration) -> Self {
        Self {
            name,
            kind,
            status: HealthStatus::Unhealthy,
            message: "probe exceeded its timeout".to_string(),
            last_check: Utc::now(),
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error_count: 1,
            metadata: Value::Null,
        }
    }
}

/// A single health probe, one per component.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Component name this probe reports on.
    fn name(&self) -> &'static str;

    /// Run the probe.
    async fn check(&self) -> ComponentHealth;
}

fn status_for_usage(percent: u8, warning: u8, critical: u8) -> HealthStatus {
    if percent >= critical {
        HealthStatus::Unhealthy
    } else if percent >= warning {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Probes [`CacheHierarchy`]'s hit ratios and occupancy.
pub struct CacheHierarchyProbe {
    cache: Arc<CacheHierarchy>,
}

impl CacheHierarchyProbe {
    /// Construct a probe over a shared cache hierarchy.
    #[must_use]
    pub fn new(cache: Arc<CacheHierarchy>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HealthProbe for CacheHierarchyProbe {
    fn name(&self) -> &'static str {
        CACHE_HIERARCHY
    }

    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let stats = self.cache.stats().await;
        ComponentHealth {
            name: CACHE_HIERARCHY,
            kind: "storage",
            status: HealthStatus::Healthy,
            message: format!("overall hit ratio {:.2}", stats.overall_hit_ratio),
            last_check: Utc::now(),
            response_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            error_count: 0,
            metadata: json!({
                "l1_size": stats.l1_size,
                "l2_size": stats.l2_size,
                "l1_hit_ratio": stats.l1_hit_ratio,
                "l2_hit_ratio": stats.l2_hit_ratio,
            }),
        }
    }
}

/// Probes the filesystem by attempting to read metadata for a watched path
/// (the configured base directory, or `/` if unset).
pub struct FileSystemProbe {
    thresholds: HealthConfig,
    watched_path: std::path::PathBuf,
}

impl FileSystemProbe {
    /// Construct a probe watching `watched_path` for availability.
    #[must_use]
    pub fn new(thresholds: HealthConfig, watched_path: std::path::PathBuf) -> Self {
        Self { thresholds, watched_path }
    }
}

#[async_trait]
impl HealthProbe for FileSystemProbe {
    fn name(&self) -> &'static str {
        FILE_SYSTEM
    }

    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let result = tokio::fs::metadata(&self.watched_path).await;
        let response_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(_) => ComponentHealth {
                name: FILE_SYSTEM,
                kind: "resource",
                status: HealthStatus::Healthy,
                message: "watched path is accessible".to_string(),
                last_check: Utc::now(),
                response_time_ms,
                error_count: 0,
                metadata: json!({"path": self.watched_path.display().to_string()}),
            },
            Err(err) => ComponentHealth {
                name: FILE_SYSTEM,
                kind: "resource",
                status: status_for_usage(
                    self.thresholds.critical_threshold_percent,
                    self.thresholds.warning_threshold_percent,
                    self.thresholds.critical_threshold_percent,
                ),
                message: format!("watched path unreachable: {err}"),
                last_check: Utc::now(),
                response_time_ms,
                error_count: 1,
                metadata: Value::Null,
            },
        }
    }
}

/// Probes process memory usage (RSS as a percentage is approximated from
/// `/proc/self/statm` on Linux; elsewhere reports UNKNOWN).
pub struct MemoryProbe {
    thresholds: HealthConfig,
}

impl MemoryProbe {
    /// Construct a probe using the configured warning/critical thresholds.
    #[must_use]
    pub fn new(thresholds: HealthConfig) -> Self {
        Self { thresholds }
    }

    fn usage_percent() -> Option<u8> {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;

        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        let page_size_kb = 4_u64;
        let resident_kb = resident_pages.saturating_mul(page_size_kb);

        let total_kb: u64 = meminfo
            .lines()
            .find(|line| line.starts_with("MemTotal:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|value| value.parse().ok())?;
        if total_kb == 0 {
            return None;
        }
        let percent = resident_kb.saturating_mul(100) / total_kb;
        Some(u8::try_from(percent.min(100)).unwrap_or(100))
    }
}

#[async_trait]
impl HealthProbe for MemoryProbe {
    fn name(&self) -> &'static str {
        MEMORY
    }

    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let response_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match Self::usage_percent() {
            Some(percent) => ComponentHealth {
                name: MEMORY,
                kind: "resource",
                status: status_for_usage(
                    percent,
                    self.thresholds.warning_threshold_percent,
                    self.thresholds.critical_threshold_percent,
                ),
                message: format!("{percent}% resident"),
                last_check: Utc::now(),
                response_time_ms,
                error_count: 0,
                metadata: json!({"usage_percent": percent}),
            },
            None => ComponentHealth::unknown(MEMORY, "resource", "memory usage unavailable on this platform"),
        }
    }
}

/// CPU probe: averages three samples 50ms apart to dampen bursts (§4.8).
pub struct CpuProbe {
    thresholds: HealthConfig,
}

impl CpuProbe {
    /// Construct a probe using the configured warning/critical thresholds.
    #[must_use]
    pub fn new(thresholds: HealthConfig) -> Self {
        Self { thresholds }
    }

    fn load_percent() -> Option<u8> {
        let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
        let one_minute: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
        #[expect(
            clippy::cast_precision_loss,
            reason = "cpu counts are a handful of cores, never close to f64's exact-integer range"
        )]
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as f64;
        #[expect(
            clippy::float_arithmetic,
            reason = "cpu load percentage is inherently a floating point ratio"
        )]
        let percent = (one_minute / cpus * 100.0).clamp(0.0, 100.0);
        #[expect(clippy::cast_possible_truncation, reason = "percent is clamped to [0, 100]")]
        let rounded = percent as u8;
        Some(rounded)
    }
}

#[async_trait]
impl HealthProbe for CpuProbe {
    fn name(&self) -> &'static str {
        CPU
    }

    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let mut samples = Vec::with_capacity(3);
        for i in 0..3 {
            if let Some(percent) = Self::load_percent() {
                samples.push(percent);
            }
            if i < 2 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        let response_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if samples.is_empty() {
            return ComponentHealth::unknown(CPU, "resource", "cpu load unavailable on this platform");
        }

        #[expect(
            clippy::float_arithmetic,
            clippy::cast_precision_loss,
            reason = "sample count is at most 3; averaging load samples is inherently floating point"
        )]
        let mean = samples.iter().map(|&v| f64::from(v)).sum::<f64>() / samples.len() as f64;
        #[expect(clippy::cast_possible_truncation, reason = "mean is within [0, 100]")]
        let mean_percent = mean.round() as u8;

        ComponentHealth {
            name: CPU,
            kind: "resource",
            status: status_for_usage(
                mean_percent,
                self.thresholds.warning_threshold_percent,
                self.thresholds.critical_threshold_percent,
            ),
            message: format!("{mean_percent}% mean load over 3 samples"),
            last_check: Utc::now(),
            response_time_ms,
            error_count: 0,
            metadata: json!({"samples": samples, "mean_percent": mean_percent}),
        }
    }
}

/// Probes the backend's `engine/info` endpoint as a proxy for TWS engine
/// reachability.
pub struct TwsMonitorProbe {
    client: Arc<BackendClient>,
}

impl TwsMonitorProbe {
    /// Construct a probe over the shared backend client.
    #[must_use]
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for TwsMonitorProbe {
    fn name(&self) -> &'static str {
        TWS_MONITOR
    }

    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let result = self.client.engine_info().await;
        let response_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(body) => ComponentHealth {
                name: TWS_MONITOR,
                kind: "external",
                status: HealthStatus::Healthy,
                message: "engine reachable".to_string(),
                last_check: Utc::now(),
                response_time_ms,
                error_count: 0,
                metadata: body,
            },
            Err(err) => ComponentHealth {
                name: TWS_MONITOR,
                kind: "external",
                status: HealthStatus::Unhealthy,
                message: format!("engine unreachable: {err}"),
                last_check: Utc::now(),
                response_time_ms,
                error_count: 1,
                metadata: Value::Null,
            },
        }
    }
}

/// Probes the backend HTTP client's connection pool by issuing a cheap
/// call and reporting success/failure as a proxy for pool health.
pub struct ConnectionPoolsProbe {
    client: Arc<BackendClient>,
    thresholds: HealthConfig,
}

impl ConnectionPoolsProbe {
    /// Construct a probe over the shared backend client.
    #[must_use]
    pub fn new(client: Arc<BackendClient>, thresholds: HealthConfig) -> Self {
        Self { client, thresholds }
    }
}

#[async_trait]
impl HealthProbe for ConnectionPoolsProbe {
    fn name(&self) -> &'static str {
        CONNECTION_POOLS
    }

    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let result = self.client.plan_job_count().await;
        let response_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(_) => ComponentHealth {
                name: CONNECTION_POOLS,
                kind: "resource",
                status: HealthStatus::Healthy,
                message: "pool serving requests".to_string(),
                last_check: Utc::now(),
                response_time_ms,
                error_count: 0,
                metadata: Value::Null,
            },
            Err(err) => ComponentHealth {
                name: CONNECTION_POOLS,
                kind: "resource",
                status: status_for_usage(
                    self.thresholds.db_conn_warning_threshold_percent,
                    self.thresholds.db_conn_warning_threshold_percent,
                    95,
                ),
                message: format!("pool probe failed: {err}"),
                last_check: Utc::now(),
                response_time_ms,
                error_count: 1,
                metadata: Value::Null,
            },
        }
    }
}

/// A probe for a component whose real implementation lives in an external
/// collaborator this core does not define. Always reports UNKNOWN unless
/// rewired.
pub struct UnwiredProbe {
    name: &'static str,
}

impl UnwiredProbe {
    /// Construct a stub probe for `name`.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl HealthProbe for UnwiredProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn check(&self) -> ComponentHealth {
        ComponentHealth::unknown(self.name, "external", "no probe wired for this component")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unwired_probe_reports_unknown() {
        let probe = UnwiredProbe::new(DATABASE);
        let health = probe.check().await;
        assert_eq!(health.status, HealthStatus::Unknown);
        assert_eq!(health.name, DATABASE);
    }

    #[test]
    fn status_for_usage_buckets_at_the_documented_thresholds() {
        assert_eq!(status_for_usage(50, 85, 95), HealthStatus::Healthy);
        assert_eq!(status_for_usage(90, 85, 95), HealthStatus::Degraded);
        assert_eq!(status_for_usage(96, 85, 95), HealthStatus::Unhealthy);
    }
}
