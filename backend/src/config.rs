//! Environment-driven configuration for the gateway's components.
//!
//! Each component owns a small typed config struct with a `from_env`/
//! `from_env_with` pair, mirroring the idempotency configuration pattern:
//! production code calls `from_env()`, tests construct a stub implementing
//! [`GatewayEnv`] and call `from_env_with(&stub)` instead of mutating the
//! real process environment. There is deliberately no single monolithic
//! settings object here — loading, parsing and validating a process-wide
//! configuration file is the external configuration loader's job, not this
//! core's.

use std::time::Duration;

/// Environment abstraction used by every component's `from_env_with`.
pub trait GatewayEnv {
    /// Fetch a string value by name.
    fn string(&self, name: &str) -> Option<String>;
}

/// Environment access backed by the real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl GatewayEnv for ProcessEnv {
    fn string(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

fn parse_clamped<T>(env: &impl GatewayEnv, key: &str, default: T, min: T, max: T) -> T
where
    T: std::str::FromStr + PartialOrd + Copy,
{
    env.string(key)
        .and_then(|s| s.parse::<T>().ok())
        .map_or(default, |v| {
            if v < min {
                min
            } else if v > max {
                max
            } else {
                v
            }
        })
}

fn parse_bool(env: &impl GatewayEnv, key: &str, default: bool) -> bool {
    env.string(key).map_or(default, |s| {
        matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y")
    })
}

/// Configuration for the two-tier cache hierarchy (§4.3, §6 keys
/// `l1_max_size`, `l1_num_shards`, `l2_ttl_seconds`, `l2_cleanup_interval`,
/// `cache_key_prefix`, `cache_encryption_enabled`).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum total L1 entries across all shards.
    pub l1_max_size: usize,
    /// Number of independently locked L1 shards.
    pub l1_num_shards: usize,
    /// Time-to-live for L2 entries.
    pub l2_ttl: Duration,
    /// Interval at which the L2 cleanup task sweeps expired entries.
    pub l2_cleanup_interval: Duration,
    /// Optional prefix applied to every key (decision 3 in `DESIGN.md`).
    pub key_prefix: Option<String>,
    /// Whether values are wrapped in an opaque envelope before storage.
    pub envelope_enabled: bool,
}

impl CacheConfig {
    const DEFAULT_L1_MAX_SIZE: usize = 1000;
    const DEFAULT_L1_NUM_SHARDS: usize = 16;
    const DEFAULT_L2_TTL_SECONDS: u64 = 300;
    const DEFAULT_L2_CLEANUP_INTERVAL_SECONDS: u64 = 30;

    /// Load from the real process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(&ProcessEnv)
    }

    /// Load from a custom environment source.
    pub fn from_env_with(env: &impl GatewayEnv) -> Self {
        Self {
            l1_max_size: parse_clamped(env, "L1_MAX_SIZE", Self::DEFAULT_L1_MAX_SIZE, 1, 10_000_000),
            l1_num_shards: parse_clamped(env, "L1_NUM_SHARDS", Self::DEFAULT_L1_NUM_SHARDS, 1, 4096),
            l2_ttl: Duration::from_secs(parse_clamped(
                env,
                "L2_TTL_SECONDS",
                Self::DEFAULT_L2_TTL_SECONDS,
                1,
                86_400 * 30,
            )),
            l2_cleanup_interval: Duration::from_secs(parse_clamped(
                env,
                "L2_CLEANUP_INTERVAL",
                Self::DEFAULT_L2_CLEANUP_INTERVAL_SECONDS,
                1,
                86_400,
            )),
            key_prefix: env.string("CACHE_KEY_PREFIX"),
            envelope_enabled: parse_bool(env, "CACHE_ENCRYPTION_ENABLED", false),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_env_with(&StubEmptyEnv)
    }
}

/// Configuration for the on-demand dependency graph service (§4.6, §6 keys
/// `graph_ttl_seconds`, `graph_max_depth`).
#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    /// Lifetime of a built graph before it is rebuilt from the backend.
    pub graph_ttl: Duration,
    /// Maximum BFS expansion depth from the root job.
    pub max_depth: u8,
}

impl GraphConfig {
    const DEFAULT_TTL_SECONDS: u64 = 300;
    const DEFAULT_MAX_DEPTH: u8 = 5;

    /// Load from the real process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(&ProcessEnv)
    }

    /// Load from a custom environment source.
    pub fn from_env_with(env: &impl GatewayEnv) -> Self {
        Self {
            graph_ttl: Duration::from_secs(parse_clamped(
                env,
                "GRAPH_TTL_SECONDS",
                Self::DEFAULT_TTL_SECONDS,
                1,
                86_400,
            )),
            max_depth: parse_clamped(env, "GRAPH_MAX_DEPTH", Self::DEFAULT_MAX_DEPTH, 1, 20),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from_env_with(&StubEmptyEnv)
    }
}

/// Configuration for the health orchestrator (§4.8, §6 keys
/// `component_timeout_seconds`, `health_timeout_seconds`,
/// `max_history_entries`, `retention_days`).
#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    /// Per-probe timeout.
    pub component_timeout: Duration,
    /// Timeout for the whole comprehensive check.
    pub overall_timeout: Duration,
    /// Bounded ring size for history entries.
    pub max_history_entries: usize,
    /// Additional age-based eviction for history entries.
    pub retention_days: u32,
    /// Disk/memory/CPU usage percentage that triggers a DEGRADED reading.
    pub warning_threshold_percent: u8,
    /// Disk/memory/CPU usage percentage that triggers an UNHEALTHY reading.
    pub critical_threshold_percent: u8,
    /// Connection-pool usage percentage that triggers a DEGRADED reading.
    pub db_conn_warning_threshold_percent: u8,
}

impl HealthConfig {
    /// Load from the real process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(&ProcessEnv)
    }

    /// Load from a custom environment source.
    pub fn from_env_with(env: &impl GatewayEnv) -> Self {
        Self {
            component_timeout: Duration::from_secs(parse_clamped(
                env,
                "COMPONENT_TIMEOUT_SECONDS",
                10,
                1,
                300,
            )),
            overall_timeout: Duration::from_secs(parse_clamped(
                env,
                "HEALTH_TIMEOUT_SECONDS",
                30,
                1,
                600,
            )),
            max_history_entries: parse_clamped(env, "MAX_HISTORY_ENTRIES", 100, 1, 100_000),
            retention_days: parse_clamped(env, "RETENTION_DAYS", 7, 1, 3650),
            warning_threshold_percent: parse_clamped(env, "HEALTH_WARNING_PERCENT", 85, 1, 100),
            critical_threshold_percent: parse_clamped(env, "HEALTH_CRITICAL_PERCENT", 95, 1, 100),
            db_conn_warning_threshold_percent: parse_clamped(
                env,
                "DB_CONN_THRESHOLD_PERCENT",
                80,
                1,
                100,
            ),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::from_env_with(&StubEmptyEnv)
    }
}

/// Configuration for the proactive poller (§4.7, §6 key
/// `polling_interval_seconds`).
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Cadence between backend snapshots.
    pub polling_interval: Duration,
    /// Consecutive failures before the additive backoff engages.
    pub failure_threshold: u32,
    /// Cap on the additive backoff.
    pub max_backoff: Duration,
}

impl PollerConfig {
    /// Load from the real process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(&ProcessEnv)
    }

    /// Load from a custom environment source.
    pub fn from_env_with(env: &impl GatewayEnv) -> Self {
        Self {
            polling_interval: Duration::from_secs(parse_clamped(
                env,
                "POLLING_INTERVAL_SECONDS",
                30,
                1,
                3600,
            )),
            failure_threshold: parse_clamped(env, "POLLER_FAILURE_THRESHOLD", 3, 1, 100),
            max_backoff: Duration::from_secs(parse_clamped(
                env,
                "POLLER_MAX_BACKOFF_SECONDS",
                300,
                1,
                3600,
            )),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from_env_with(&StubEmptyEnv)
    }
}

/// A [`GatewayEnv`] that reports every key as unset, used to derive
/// `Default` for config structs in terms of their documented defaults
/// without touching the real process environment.
struct StubEmptyEnv;

impl GatewayEnv for StubEmptyEnv {
    fn string(&self, _name: &str) -> Option<String> {
        None
    }
}
