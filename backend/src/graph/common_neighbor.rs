//! Common-neighbor intersection queries (§4.6 point 3).

use std::collections::{HashMap, HashSet};

use super::analysis::ancestors;
use super::model::DependencyGraph;

/// Risk bucket for [`check_resource_conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictRisk {
    /// No shared predecessors.
    None,
    /// 1-2 shared predecessors.
    Low,
    /// 3-5 shared predecessors.
    Medium,
    /// More than 5 shared predecessors.
    High,
}

impl ConflictRisk {
    fn from_common_predecessor_count(count: usize) -> Self {
        match count {
            0 => Self::None,
            1..=2 => Self::Low,
            3..=5 => Self::Medium,
            _ => Self::High,
        }
    }

    /// One step up the bucket scale, saturating at [`Self::High`].
    #[must_use]
    pub const fn escalate(self) -> Self {
        match self {
            Self::None => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

/// Result of [`check_resource_conflict`].
#[derive(Debug, Clone)]
pub struct ResourceConflict {
    /// Predecessors shared by both jobs.
    pub common_predecessors: Vec<String>,
    /// Successors shared by both jobs.
    pub common_successors: Vec<String>,
    /// Derived risk bucket.
    pub conflict_risk: ConflictRisk,
}

/// Nodes that are ancestors of at least two jobs in `job_list`, sorted by
/// how many of those jobs they are an ancestor of, descending.
#[must_use]
pub fn find_shared_bottlenecks(graph: &DependencyGraph, job_list: &[String]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for job in job_list {
        let job_ancestors: HashSet<String> = ancestors(graph, job).into_iter().collect();
        for ancestor in job_ancestors {
            *counts.entry(ancestor).or_insert(0) += 1;
        }
    }
    let mut bottlenecks: Vec<(String, usize)> = counts.into_iter().filter(|(_, count)| *count >= 2).collect();
    bottlenecks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    bottlenecks
}

/// Compare two jobs' direct neighborhoods, flipping the risk bucket one
/// step up when `resource_map` shows them sharing a resource.
#[must_use]
pub fn check_resource_conflict(
    graph: &DependencyGraph,
    job_a: &str,
    job_b: &str,
    resource_map: Option<&HashMap<String, HashSet<String>>>,
) -> ResourceConflict {
    let predecessors_a: HashSet<String> = graph.predecessors(job_a).into_iter().collect();
    let predecessors_b: HashSet<String> = graph.predecessors(job_b).into_iter().collect();
    let successors_a: HashSet<String> = graph.successors(job_a).into_iter().collect();
    let successors_b: HashSet<String> = graph.successors(job_b).into_iter().collect();

    let mut common_predecessors: Vec<String> = predecessors_a.intersection(&predecessors_b).cloned().collect();
    common_predecessors.sort();
    let mut common_successors: Vec<String> = successors_a.intersection(&successors_b).cloned().collect();
    common_successors.sort();

    let mut risk = ConflictRisk::from_common_predecessor_count(common_predecessors.len());

    if let Some(resources) = resource_map {
        let resources_a = resources.get(job_a);
        let resources_b = resources.get(job_b);
        if let (Some(resources_a), Some(resources_b)) = (resources_a, resources_b) {
            if resources_a.intersection(resources_b).next().is_some() {
                risk = risk.escalate();
            }
        }
    }

    ResourceConflict {
        common_predecessors,
        common_successors,
        conflict_risk: risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Confidence, Relation};
    use chrono::Utc;

    fn chain(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (source, target) in edges {
            graph.upsert_edge(source, target, Relation::DependsOn, Confidence::Inferred, [], Utc::now());
        }
        graph
    }

    #[test]
    fn shared_bottlenecks_require_at_least_two_dependents() {
        let graph = chain(&[("root", "a"), ("root", "b"), ("solo", "c")]);
        let bottlenecks = find_shared_bottlenecks(
            &graph,
            &["a".to_string(), "b".to_string(), "c".to_string()],
        );
        assert_eq!(bottlenecks, vec![("root".to_string(), 2)]);
    }

    #[test]
    fn resource_conflict_risk_buckets_by_shared_predecessor_count() {
        let graph = chain(&[("p1", "a"), ("p1", "b"), ("p2", "a"), ("p2", "b")]);
        let conflict = check_resource_conflict(&graph, "a", "b", None);
        assert_eq!(conflict.common_predecessors.len(), 2);
        assert_eq!(conflict.conflict_risk, ConflictRisk::Low);
    }

    #[test]
    fn shared_resource_escalates_risk_by_one_bucket() {
        let graph = chain(&[("p1", "a"), ("p1", "b")]);
        let mut resources = HashMap::new();
        resources.insert("a".to_string(), HashSet::from(["tape-drive".to_string()]));
        resources.insert("b".to_string(), HashSet::from(["tape-drive".to_string()]));

        let conflict = check_resource_conflict(&graph, "a", "b", Some(&resources));
        assert_eq!(conflict.conflict_risk, ConflictRisk::Medium);
    }
}
