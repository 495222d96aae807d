//! Configuration for the backend client (C4).

use std::time::Duration;

use crate::config::GatewayEnv;

/// Connection settings for the workload backend.
#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    /// Scheme+host+port the client talks to, e.g. `https://tws.example:31116`.
    pub base_url: String,
    /// HTTP Basic auth username.
    pub username: String,
    /// HTTP Basic auth password.
    pub password: String,
    /// Engine name identifying this gateway to the backend, if configured.
    pub engine_name: Option<String>,
    /// Engine owner identifying this gateway to the backend, if configured.
    pub engine_owner: Option<String>,
    /// Whether the underlying HTTP client should honour `HTTP_PROXY`/
    /// `NO_PROXY`-style environment variables.
    pub trust_env: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl BackendClientConfig {
    /// Load from the real process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(&crate::config::ProcessEnv)
    }

    /// Load from a custom environment source.
    pub fn from_env_with(env: &impl GatewayEnv) -> Self {
        Self {
            base_url: env
                .string("BACKEND_BASE_URL")
                .unwrap_or_else(|| "http://localhost:31116".to_string()),
            username: env.string("BACKEND_USERNAME").unwrap_or_default(),
            password: env.string("BACKEND_PASSWORD").unwrap_or_default(),
            engine_name: env.string("BACKEND_ENGINE_NAME"),
            engine_owner: env.string("BACKEND_ENGINE_OWNER"),
            trust_env: env
                .string("BACKEND_TRUST_ENV")
                .is_none_or(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            timeout: Duration::from_secs(
                env.string("BACKEND_TIMEOUT_SECONDS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl GatewayEnv for MapEnv {
        fn string(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|s| (*s).to_string())
        }
    }

    #[test]
    fn defaults_when_unset() {
        let config = BackendClientConfig::from_env_with(&MapEnv(HashMap::new()));
        assert_eq!(config.base_url, "http://localhost:31116");
        assert!(config.trust_env);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn reads_overrides() {
        let env = MapEnv(HashMap::from([
            ("BACKEND_BASE_URL", "https://tws.example:31116"),
            ("BACKEND_TRUST_ENV", "false"),
            ("BACKEND_TIMEOUT_SECONDS", "5"),
        ]));
        let config = BackendClientConfig::from_env_with(&env);
        assert_eq!(config.base_url, "https://tws.example:31116");
        assert!(!config.trust_env);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
