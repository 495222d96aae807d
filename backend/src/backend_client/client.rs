//! Reqwest-backed client for the workload backend's read-only REST surface.
//!
//! This adapter owns transport details only: request construction, basic
//! auth, timeout, HTTP error mapping, metric emission, and JSON decoding —
//! it neither caches (C3 wraps it for that) nor retries (C1 wraps it for
//! that).

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use serde_json::Value;

use crate::metrics::{normalize_endpoint, Metrics};

use super::config::BackendClientConfig;
use super::error::BackendClientError;
use super::types::{ConsumedJobRunsQuery, Depth, Limit, ModelQuery, PlanJobQuery};

const BODY_PREVIEW_CHARS: usize = 200;

/// Read-only HTTP client for `{base_url}/twsd/api/v2/...`.
pub struct BackendClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    metrics: Arc<Metrics>,
}

impl BackendClient {
    /// Build a client from configuration and a shared metrics registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `reqwest` client cannot be built.
    pub fn new(config: &BackendClientConfig, metrics: Arc<Metrics>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().timeout(config.timeout);
        if !config.trust_env {
            builder = builder.no_proxy();
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            metrics,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/twsd/api/v2/{path}", self.base_url)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, BackendClientError> {
        let endpoint = normalize_endpoint(path);
        let latency = self
            .metrics
            .histogram(
                "backend_request_latency_seconds",
                "Backend request latency",
                &["endpoint"],
                None,
            )
            .ok();
        let requests = self
            .metrics
            .counter(
                "backend_request_total",
                "Backend requests by endpoint and status",
                &["endpoint", "status"],
            )
            .ok();

        let start = Instant::now();
        let result = self
            .http
            .get(self.url(path))
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .send()
            .await;

        if let Some(latency) = &latency {
            latency
                .with_label_values(&[endpoint.as_str()])
                .observe(start.elapsed().as_secs_f64());
        }

        let response = match result {
            Ok(response) => response,
            Err(source) => {
                if let Some(requests) = &requests {
                    let status = if source.is_timeout() { "timeout" } else { "error" };
                    requests.with_label_values(&[endpoint.as_str(), status]).inc();
                }
                return Err(if source.is_timeout() {
                    BackendClientError::Timeout { endpoint }
                } else {
                    BackendClientError::Transport { endpoint, source }
                });
            }
        };

        let status = response.status();
        if let Some(requests) = &requests {
            requests
                .with_label_values(&[endpoint.as_str(), status.as_u16().to_string().as_str()])
                .inc();
        }

        let body = response.bytes().await.map_err(|source| BackendClientError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;

        if !status.is_success() {
            let body_preview: String = String::from_utf8_lossy(&body)
                .chars()
                .take(BODY_PREVIEW_CHARS)
                .collect();
            return Err(BackendClientError::Http {
                status: status.as_u16(),
                endpoint,
                body_preview,
            });
        }

        serde_json::from_slice(&body).map_err(|source| BackendClientError::Decode { endpoint, source })
    }

    /// `GET engine/info`.
    pub async fn engine_info(&self) -> Result<Value, BackendClientError> {
        self.get("engine/info", &[]).await
    }

    /// `GET engine/configuration?key=`.
    pub async fn engine_configuration(&self, key: &str) -> Result<Value, BackendClientError> {
        self.get("engine/configuration", &[("key", key.to_string())]).await
    }

    /// `GET model/user`.
    pub async fn list_users(&self) -> Result<Value, BackendClientError> {
        self.get("model/user", &[]).await
    }

    /// `GET model/group`.
    pub async fn list_groups(&self) -> Result<Value, BackendClientError> {
        self.get("model/group", &[]).await
    }

    /// `GET model/jobdefinition`.
    pub async fn query_job_definitions(&self, query: &ModelQuery) -> Result<Value, BackendClientError> {
        self.get("model/jobdefinition", &query.to_pairs()).await
    }

    /// `GET model/jobdefinition/{id}`.
    pub async fn get_job_definition(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("model/jobdefinition/{id}"), &[]).await
    }

    /// `GET model/jobstream`.
    pub async fn query_job_streams(&self, query: &ModelQuery) -> Result<Value, BackendClientError> {
        self.get("model/jobstream", &query.to_pairs()).await
    }

    /// `GET model/jobstream/{id}`.
    pub async fn get_job_stream(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("model/jobstream/{id}"), &[]).await
    }

    /// `GET model/workstation`.
    pub async fn query_workstations(&self, query: &ModelQuery) -> Result<Value, BackendClientError> {
        self.get("model/workstation", &query.to_pairs()).await
    }

    /// `GET model/workstation/{id}`.
    pub async fn get_workstation(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("model/workstation/{id}"), &[]).await
    }

    /// `GET plan/job`.
    pub async fn query_plan_jobs(&self, query: &PlanJobQuery) -> Result<Value, BackendClientError> {
        self.get("plan/job", &query.to_pairs()).await
    }

    /// `GET plan/job/{id}`.
    pub async fn get_plan_job(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("plan/job/{id}"), &[]).await
    }

    /// `GET plan/job/{id}/predecessors?depth=`.
    pub async fn plan_job_predecessors(
        &self,
        id: &str,
        depth: Option<Depth>,
    ) -> Result<Value, BackendClientError> {
        self.get_with_optional_depth(&format!("plan/job/{id}/predecessors"), depth).await
    }

    /// `GET plan/job/{id}/successors?depth=`.
    pub async fn plan_job_successors(
        &self,
        id: &str,
        depth: Option<Depth>,
    ) -> Result<Value, BackendClientError> {
        self.get_with_optional_depth(&format!("plan/job/{id}/successors"), depth).await
    }

    /// `GET plan/job/{id}/model`.
    pub async fn plan_job_model(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("plan/job/{id}/model"), &[]).await
    }

    /// `GET plan/job/{id}/model/description`.
    pub async fn plan_job_model_description(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("plan/job/{id}/model/description"), &[]).await
    }

    /// `GET plan/job/count`.
    pub async fn plan_job_count(&self) -> Result<Value, BackendClientError> {
        self.get("plan/job/count", &[]).await
    }

    /// `GET plan/job/issues`.
    pub async fn plan_job_issues(&self) -> Result<Value, BackendClientError> {
        self.get("plan/job/issues", &[]).await
    }

    /// `GET plan/job/joblog`.
    pub async fn plan_job_joblog(&self) -> Result<Value, BackendClientError> {
        self.get("plan/job/joblog", &[]).await
    }

    /// `GET plan/jobstream`.
    pub async fn query_plan_job_streams(&self, query: &ModelQuery) -> Result<Value, BackendClientError> {
        self.get("plan/jobstream", &query.to_pairs()).await
    }

    /// `GET plan/jobstream/{id}`.
    pub async fn get_plan_job_stream(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("plan/jobstream/{id}"), &[]).await
    }

    /// `GET plan/jobstream/{id}/predecessors?depth=`.
    pub async fn plan_job_stream_predecessors(
        &self,
        id: &str,
        depth: Option<Depth>,
    ) -> Result<Value, BackendClientError> {
        self.get_with_optional_depth(&format!("plan/jobstream/{id}/predecessors"), depth)
            .await
    }

    /// `GET plan/jobstream/{id}/successors?depth=`.
    pub async fn plan_job_stream_successors(
        &self,
        id: &str,
        depth: Option<Depth>,
    ) -> Result<Value, BackendClientError> {
        self.get_with_optional_depth(&format!("plan/jobstream/{id}/successors"), depth)
            .await
    }

    /// `GET plan/jobstream/{id}/model/description`.
    pub async fn plan_job_stream_model_description(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("plan/jobstream/{id}/model/description"), &[]).await
    }

    /// `GET plan/jobstream/count`.
    pub async fn plan_job_stream_count(&self) -> Result<Value, BackendClientError> {
        self.get("plan/jobstream/count", &[]).await
    }

    /// `GET plan/resource`.
    pub async fn query_plan_resources(&self, query: &ModelQuery) -> Result<Value, BackendClientError> {
        self.get("plan/resource", &query.to_pairs()).await
    }

    /// `GET plan/resource/{id}`.
    pub async fn get_plan_resource(&self, id: &str) -> Result<Value, BackendClientError> {
        self.get(&format!("plan/resource/{id}"), &[]).await
    }

    /// `GET plan/folder/objects-count?folder=`.
    pub async fn plan_folder_objects_count(&self, folder: &str) -> Result<Value, BackendClientError> {
        self.get("plan/folder/objects-count", &[("folder", folder.to_string())])
            .await
    }

    /// `GET plan/consumed-jobs/runs?jobName=&limit=`.
    pub async fn consumed_job_runs(
        &self,
        query: &ConsumedJobRunsQuery,
    ) -> Result<Value, BackendClientError> {
        self.get("plan/consumed-jobs/runs", &query.to_pairs()).await
    }

    async fn get_with_optional_depth(
        &self,
        path: &str,
        depth: Option<Depth>,
    ) -> Result<Value, BackendClientError> {
        let query: Vec<(&str, String)> = depth
            .map(|d| vec![("depth", d.value().to_string())])
            .unwrap_or_default();
        self.get(path, &query).await
    }
}

/// A default result-set limit, re-exported for callers building
/// [`ModelQuery`]/[`PlanJobQuery`] without needing to import [`Limit`]
/// directly.
#[must_use]
pub fn default_limit() -> Limit {
    Limit::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> BackendClientConfig {
        BackendClientConfig {
            base_url,
            username: "user".to_string(),
            password: "pass".to_string(),
            engine_name: None,
            engine_owner: None,
            trust_env: true,
            timeout: std::time::Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn engine_info_returns_json_body_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twsd/api/v2/engine/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": "9.5"})))
            .mount(&server)
            .await;

        let client = BackendClient::new(&config(server.uri()), Arc::new(Metrics::new())).expect("client");
        let body = client.engine_info().await.expect("success");
        assert_eq!(body["version"], "9.5");
    }

    #[tokio::test]
    async fn non_success_status_becomes_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twsd/api/v2/plan/job/123"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = BackendClient::new(&config(server.uri()), Arc::new(Metrics::new())).expect("client");
        let err = client.get_plan_job("123").await.expect_err("404 should error");
        assert!(matches!(err, BackendClientError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn depth_query_parameter_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twsd/api/v2/plan/job/123/predecessors"))
            .and(query_param("depth", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = BackendClient::new(&config(server.uri()), Arc::new(Metrics::new())).expect("client");
        client
            .plan_job_predecessors("123", Some(Depth::new(3)))
            .await
            .expect("success");
    }
}
