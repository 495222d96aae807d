//! Recovery manager (§4.8): best-effort remediation for an unhealthy
//! component, with per-component strategies grounded in the original
//! `recovery_manager.py`.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use crate::cache::CacheHierarchy;
use crate::resilience::CircuitBreakerRegistry;

use super::probe::CACHE_HIERARCHY;

/// Outcome of [`attempt_component_recovery`].
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    /// Whether the recovery attempt improved the component's condition.
    pub success: bool,
    /// The component recovery was attempted on.
    pub component: String,
    /// A short label for the strategy used, e.g. `"cache_reset"`.
    pub recovery_type: String,
    /// How long the attempt took.
    pub duration_ms: u64,
    /// Ordered list of actions taken.
    pub actions: Vec<String>,
    /// Strategy-specific structured detail.
    pub metadata: Value,
    /// Failure detail, if the attempt did not succeed.
    pub error: Option<String>,
}

/// Attempt to recover `component`, dispatching to a per-component strategy.
///
/// This gateway owns `cache_hierarchy` directly, so that strategy is real;
/// everything else (including the externally-owned `database`) gets the
/// generic probe-and-report strategy, since there is no local resource to
/// actually reset.
pub async fn attempt_component_recovery(
    component: &str,
    cache: Option<&Arc<CacheHierarchy>>,
    breakers: &CircuitBreakerRegistry,
) -> RecoveryResult {
    let start = Instant::now();
    let (recovery_type, success, actions, metadata, error) = if component == CACHE_HIERARCHY {
        recover_cache_hierarchy(cache).await
    } else {
        generic_probe(component, breakers)
    };

    RecoveryResult {
        success,
        component: component.to_string(),
        recovery_type: recovery_type.to_string(),
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        actions,
        metadata,
        error,
    }
}

async fn recover_cache_hierarchy(
    cache: Option<&Arc<CacheHierarchy>>,
) -> (&'static str, bool, Vec<String>, Value, Option<String>) {
    let Some(cache) = cache else {
        return (
            "cache_reset",
            false,
            vec!["connectivity-probe".to_string()],
            Value::Null,
            Some("no cache hierarchy wired".to_string()),
        );
    };

    let before = cache.stats().await;
    let mut actions = vec!["connectivity-probe".to_string()];

    if before.overall_hit_ratio < 0.5 {
        cache.clear().await;
        actions.push("full-reset".to_string());
    } else {
        actions.push("clear-stale-skipped".to_string());
    }

    let after = cache.stats().await;
    (
        "cache_reset",
        true,
        actions,
        json!({"hit_ratio_before": before.overall_hit_ratio, "hit_ratio_after": after.overall_hit_ratio}),
        None,
    )
}

fn generic_probe(
    component: &str,
    breakers: &CircuitBreakerRegistry,
) -> (&'static str, bool, Vec<String>, Value, Option<String>) {
    let mut actions = vec!["connectivity-probe".to_string()];
    let breaker = breakers.get(component);
    let eligible_for_reset = breaker
        .as_ref()
        .is_some_and(|b| b.metrics().consecutive_failures > 0);

    if eligible_for_reset {
        actions.push("circuit-breaker-reset-eligible".to_string());
    }

    (
        "generic_probe",
        breaker.is_some(),
        actions,
        json!({"circuit_breaker_wired": breaker.is_some()}),
        breaker.is_none().then(|| format!("no circuit breaker registered for {component}")),
    )
}
