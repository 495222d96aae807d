//! On-demand dependency-graph construction (§4.6) with a TTL cache of
//! previously built graphs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::warn;

use crate::backend_client::{BackendClient, BackendClientError, Depth};
use crate::config::GraphConfig;

use super::error::GraphError;
use super::model::{Confidence, DependencyGraph, Relation};

/// A previously built graph, cached until `created_at + graph_ttl` elapses.
struct GraphCacheEntry {
    graph: Arc<DependencyGraph>,
    created_at: Instant,
}

/// Point-in-time cache occupancy, for [`GraphService::cache_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Total cached entries, valid or expired.
    pub total: usize,
    /// Entries still within their TTL.
    pub valid: usize,
    /// Entries past their TTL but not yet swept.
    pub expired: usize,
    /// The configured TTL, in seconds.
    pub ttl_seconds: u64,
}

/// Builds and caches dependency graphs from the workload backend.
pub struct GraphService {
    client: Arc<BackendClient>,
    config: GraphConfig,
    cache: Mutex<HashMap<String, GraphCacheEntry>>,
}

impl GraphService {
    /// Construct a graph service over a shared backend client.
    #[must_use]
    pub fn new(client: Arc<BackendClient>, config: GraphConfig) -> Self {
        Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(job_id: &str, depth: u8) -> String {
        format!("job:{job_id}:depth:{depth}")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, GraphCacheEntry>> {
        self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Fetch the dependency graph rooted at `job_id`, expanding up to
    /// `depth` hops (clamped to the configured max), serving from the TTL
    /// cache unless `force_refresh` is set.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::RootUnreachable`] if the root job itself
    /// cannot be reached from the backend. Transient errors while
    /// expanding further nodes are logged and skipped — a partial graph is
    /// returned rather than none.
    pub async fn get_dependency_graph(
        &self,
        job_id: &str,
        depth: u8,
        force_refresh: bool,
    ) -> Result<Arc<DependencyGraph>, GraphError> {
        let depth = depth.min(self.config.max_depth);
        let key = Self::cache_key(job_id, depth);

        if !force_refresh {
            if let Some(entry) = self.lock().get(&key) {
                if entry.created_at.elapsed() < self.config.graph_ttl {
                    return Ok(Arc::clone(&entry.graph));
                }
            }
        }

        let graph = Arc::new(self.build_graph(job_id, depth).await?);
        self.lock().insert(
            key,
            GraphCacheEntry {
                graph: Arc::clone(&graph),
                created_at: Instant::now(),
            },
        );
        Ok(graph)
    }

    async fn fetch_predecessors(&self, job_id: &str) -> Result<Vec<String>, BackendClientError> {
        let body = self.client.plan_job_predecessors(job_id, Some(Depth::new(1))).await?;
        Ok(extract_job_ids(&body))
    }

    async fn fetch_successors(&self, job_id: &str) -> Result<Vec<String>, BackendClientError> {
        let body = self.client.plan_job_successors(job_id, Some(Depth::new(1))).await?;
        Ok(extract_job_ids(&body))
    }

    async fn build_graph(&self, job_id: &str, max_depth: u8) -> Result<DependencyGraph, GraphError> {
        let mut graph = DependencyGraph::new();
        graph.ensure_node(job_id);

        let root_predecessors = self.fetch_predecessors(job_id).await;
        let root_successors = self.fetch_successors(job_id).await;
        if root_predecessors.is_err() && root_successors.is_err() {
            return Err(GraphError::RootUnreachable {
                job_id: job_id.to_string(),
            });
        }

        let mut visited = std::collections::HashSet::new();
        visited.insert(job_id.to_string());
        let mut queue = VecDeque::new();
        queue.push_back((job_id.to_string(), max_depth));

        self.apply_neighbors(&mut graph, job_id, root_predecessors.ok(), root_successors.ok());
        self.enqueue_unvisited(&mut queue, &mut visited, &graph, job_id, max_depth.saturating_sub(1));

        while let Some((node, remaining_depth)) = queue.pop_front() {
            if remaining_depth == 0 {
                continue;
            }
            let predecessors = self.fetch_predecessors(&node).await;
            let successors = self.fetch_successors(&node).await;
            if predecessors.is_err() {
                warn!(job_id = %node, "failed to fetch predecessors during graph expansion; skipping");
            }
            if successors.is_err() {
                warn!(job_id = %node, "failed to fetch successors during graph expansion; skipping");
            }

            self.apply_neighbors(&mut graph, &node, predecessors.ok(), successors.ok());
            self.enqueue_unvisited(&mut queue, &mut visited, &graph, &node, remaining_depth - 1);
        }

        Ok(graph)
    }

    fn apply_neighbors(
        &self,
        graph: &mut DependencyGraph,
        node: &str,
        predecessors: Option<Vec<String>>,
        successors: Option<Vec<String>>,
    ) {
        let now = chrono::Utc::now();
        for predecessor in predecessors.into_iter().flatten() {
            graph.upsert_edge(
                &predecessor,
                node,
                Relation::DependsOn,
                Confidence::Inferred,
                ["backend:predecessors".to_string()],
                now,
            );
        }
        for successor in successors.into_iter().flatten() {
            graph.upsert_edge(
                node,
                &successor,
                Relation::DependsOn,
                Confidence::Inferred,
                ["backend:successors".to_string()],
                now,
            );
        }
    }

    fn enqueue_unvisited(
        &self,
        queue: &mut VecDeque<(String, u8)>,
        visited: &mut std::collections::HashSet<String>,
        graph: &DependencyGraph,
        node: &str,
        remaining_depth: u8,
    ) {
        let mut neighbors = graph.predecessors(node);
        neighbors.extend(graph.successors(node));
        for neighbor in neighbors {
            if visited.insert(neighbor.clone()) {
                queue.push_back((neighbor, remaining_depth));
            }
        }
    }

    /// Drop every cached graph.
    pub fn clear_cache(&self) {
        self.lock().clear();
    }

    /// Snapshot of the cache's current occupancy.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.lock();
        let total = cache.len();
        let valid = cache
            .values()
            .filter(|entry| entry.created_at.elapsed() < self.config.graph_ttl)
            .count();
        CacheStats {
            total,
            valid,
            expired: total - valid,
            ttl_seconds: self.config.graph_ttl.as_secs(),
        }
    }
}

/// Tolerant extraction of job identifiers from an opaque backend response:
/// accepts a bare array of strings, an array of objects carrying an `id`,
/// `jobId`, or `name` field, or a `{"items": [...]}` envelope around either.
fn extract_job_ids(value: &Value) -> Vec<String> {
    let items = value.get("items").unwrap_or(value);
    let Some(array) = items.as_array() else {
        return Vec::new();
    };
    array
        .iter()
        .filter_map(|entry| {
            entry.as_str().map(str::to_string).or_else(|| {
                entry
                    .get("id")
                    .or_else(|| entry.get("jobId"))
                    .or_else(|| entry.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
        })
        .collect()
}
