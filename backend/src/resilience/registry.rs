//! Process-wide registry of named circuit breakers.
//!
//! Replaces the original's reflection-based `get_all_circuit_breakers`
//! (which walked the garbage collector for live instances) with an
//! explicit map populated at construction time, per the re-architecture
//! note on dynamic/reflective dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// Breaker names pre-registered at startup, matching the roles named in
/// the component design.
pub const HTTP_SERVICE: &str = "http_service";
/// Name for the breaker guarding calls to the workload backend.
pub const TWS_API: &str = "tws_api";
/// Name for the breaker guarding the primary LLM provider.
pub const LLM_PRIMARY: &str = "llm_primary";

/// A process-wide map of breaker name to [`CircuitBreaker`].
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            breakers: HashMap::new(),
        }
    }

    /// Register a breaker, returning the shared handle. Re-registering the
    /// same name replaces the previous breaker (its accumulated state and
    /// metrics are discarded).
    pub fn register(&mut self, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let name = config.name.clone();
        let breaker = Arc::new(CircuitBreaker::new(config));
        self.breakers.insert(name, Arc::clone(&breaker));
        breaker
    }

    /// Look up a previously registered breaker by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(Arc::clone)
    }

    /// Construct the default preset used by this gateway: one breaker per
    /// external collaborator (backend, each LLM provider) with the
    /// thresholds recommended for HTTP-like services.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CircuitBreakerConfig::new(
            TWS_API,
            5,
            Duration::from_secs(60),
        ));
        registry.register(CircuitBreakerConfig::new(
            LLM_PRIMARY,
            5,
            Duration::from_secs(60),
        ));
        registry
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_breaker_is_retrievable_by_name() {
        let mut registry = CircuitBreakerRegistry::new();
        registry.register(CircuitBreakerConfig::new("x", 5, Duration::from_secs(1)));
        assert!(registry.get("x").is_some());
        assert!(registry.get("y").is_none());
    }

    #[test]
    fn defaults_preregister_the_known_names() {
        let registry = CircuitBreakerRegistry::with_defaults();
        assert!(registry.get(TWS_API).is_some());
        assert!(registry.get(LLM_PRIMARY).is_some());
    }
}
