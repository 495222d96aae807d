//! Pure graph analyses over a built [`DependencyGraph`] (§4.6): critical
//! path, impact analysis, centrality-ranked critical jobs, and ancestor/
//! descendant chains.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::metrics::Metrics;

use super::model::DependencyGraph;

/// Direction for [`get_dependency_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDirection {
    /// Jobs this job depends on, transitively.
    Ancestors,
    /// Jobs that depend on this job, transitively.
    Descendants,
}

/// Severity bucket for [`get_impact_analysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImpactSeverity {
    /// 0-3 affected jobs.
    Low,
    /// 4-10 affected jobs.
    Medium,
    /// 11-20 affected jobs.
    High,
    /// More than 20 affected jobs.
    Critical,
}

impl ImpactSeverity {
    fn from_count(count: usize) -> Self {
        if count > 20 {
            Self::Critical
        } else if count > 10 {
            Self::High
        } else if count > 3 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Result of [`get_impact_analysis`].
#[derive(Debug, Clone)]
pub struct ImpactAnalysis {
    /// Every descendant of the queried job.
    pub affected: Vec<String>,
    /// `affected.len()`.
    pub count: usize,
    /// Severity bucket derived from `count`.
    pub severity: ImpactSeverity,
}

/// A job ranked by betweenness centrality, for [`get_critical_jobs`].
#[derive(Debug, Clone)]
pub struct CriticalJob {
    /// The job identifier.
    pub job_id: String,
    /// Its betweenness centrality score.
    pub centrality: f64,
    /// The impact-analysis severity bucket for this job's descendants.
    pub severity: ImpactSeverity,
}

fn reachable(graph: &DependencyGraph, job_id: &str, direction: Direction) -> Vec<String> {
    let Some(start) = graph.index_of(job_id) else {
        return Vec::new();
    };
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(start);
    visited.insert(start);

    while let Some(node) = queue.pop_front() {
        for neighbor in graph.inner().neighbors_directed(node, direction) {
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }
    visited
        .into_iter()
        .filter(|index| *index != start)
        .filter_map(|index| graph.job_at(index).map(str::to_string))
        .collect()
}

/// Every node reachable from `job_id` by following edges forward
/// (its transitive successors).
#[must_use]
pub fn descendants(graph: &DependencyGraph, job_id: &str) -> Vec<String> {
    reachable(graph, job_id, Direction::Outgoing)
}

/// Every node that can reach `job_id` by following edges forward
/// (its transitive predecessors).
#[must_use]
pub fn ancestors(graph: &DependencyGraph, job_id: &str) -> Vec<String> {
    reachable(graph, job_id, Direction::Incoming)
}

/// Ancestors or descendants of `job_id`, depending on `direction`.
#[must_use]
pub fn get_dependency_chain(graph: &DependencyGraph, job_id: &str, direction: ChainDirection) -> Vec<String> {
    match direction {
        ChainDirection::Ancestors => ancestors(graph, job_id),
        ChainDirection::Descendants => descendants(graph, job_id),
    }
}

/// The longest directed path in the graph, as a sequence of job
/// identifiers. Empty if the graph is cyclic (a cycle has no longest
/// path); `metrics`' `tws_graph_cycles_detected_total` counter is
/// incremented in that case.
#[must_use]
pub fn find_critical_path(graph: &DependencyGraph, metrics: &Metrics) -> Vec<String> {
    let order = match toposort(graph.inner(), None) {
        Ok(order) => order,
        Err(_cycle) => {
            if let Ok(counter) = metrics.counter(
                "tws_graph_cycles_detected_total",
                "Cycles detected while computing the critical path",
                &[],
            ) {
                counter.with_label_values(&[]).inc();
            }
            return Vec::new();
        }
    };

    let mut longest_len: HashMap<NodeIndex, usize> = HashMap::new();
    let mut predecessor: HashMap<NodeIndex, NodeIndex> = HashMap::new();

    for &node in &order {
        longest_len.entry(node).or_insert(0);
        for edge in graph.inner().edges_directed(node, Direction::Outgoing) {
            let target = edge.target();
            let candidate = longest_len.get(&node).copied().unwrap_or(0) + 1;
            if candidate > *longest_len.get(&target).unwrap_or(&0) {
                longest_len.insert(target, candidate);
                predecessor.insert(target, node);
            }
        }
    }

    let Some((&end, _)) = longest_len.iter().max_by_key(|(_, len)| **len) else {
        return Vec::new();
    };

    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = predecessor.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path.into_iter().filter_map(|index| graph.job_at(index).map(str::to_string)).collect()
}

/// Impact of `job_id` failing: its descendants, bucketed by §4.6's
/// severity thresholds.
#[must_use]
pub fn get_impact_analysis(graph: &DependencyGraph, job_id: &str) -> ImpactAnalysis {
    let affected = descendants(graph, job_id);
    let count = affected.len();
    ImpactAnalysis {
        affected,
        count,
        severity: ImpactSeverity::from_count(count),
    }
}

/// Betweenness centrality for every node (Brandes' algorithm, unweighted),
/// returning the `top_n` highest-ranked jobs with their impact severity.
#[must_use]
pub fn get_critical_jobs(graph: &DependencyGraph, top_n: usize) -> Vec<CriticalJob> {
    let centrality = betweenness_centrality(graph);
    let mut ranked: Vec<(NodeIndex, f64)> = centrality.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
        .into_iter()
        .take(top_n)
        .filter_map(|(index, score)| {
            let job_id = graph.job_at(index)?.to_string();
            let severity = get_impact_analysis(graph, &job_id).severity;
            Some(CriticalJob {
                job_id,
                centrality: score,
                severity,
            })
        })
        .collect()
}

/// Brandes' algorithm for unweighted directed graphs: O(VE) betweenness
/// centrality for every node.
#[expect(clippy::float_arithmetic, reason = "centrality accumulation is inherently floating point")]
fn betweenness_centrality(graph: &DependencyGraph) -> HashMap<NodeIndex, f64> {
    let inner = graph.inner();
    let mut centrality: HashMap<NodeIndex, f64> = inner.node_indices().map(|n| (n, 0.0)).collect();

    for source in inner.node_indices() {
        let mut stack = Vec::new();
        let mut predecessors: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        let mut sigma: HashMap<NodeIndex, f64> = inner.node_indices().map(|n| (n, 0.0)).collect();
        let mut distance: HashMap<NodeIndex, i64> = HashMap::new();
        sigma.insert(source, 1.0);
        distance.insert(source, 0);

        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(node) = queue.pop_front() {
            stack.push(node);
            let node_distance = distance.get(&node).copied().unwrap_or(0);
            let node_sigma = sigma.get(&node).copied().unwrap_or(0.0);
            for neighbor in inner.neighbors_directed(node, Direction::Outgoing) {
                if !distance.contains_key(&neighbor) {
                    distance.insert(neighbor, node_distance + 1);
                    queue.push_back(neighbor);
                }
                if distance.get(&neighbor).copied() == Some(node_distance + 1) {
                    *sigma.entry(neighbor).or_insert(0.0) += node_sigma;
                    predecessors.entry(neighbor).or_default().push(node);
                }
            }
        }

        let mut delta: HashMap<NodeIndex, f64> = inner.node_indices().map(|n| (n, 0.0)).collect();
        while let Some(node) = stack.pop() {
            let node_sigma = sigma.get(&node).copied().unwrap_or(0.0);
            let node_delta = delta.get(&node).copied().unwrap_or(0.0);
            if let Some(preds) = predecessors.get(&node) {
                for &pred in preds {
                    let pred_sigma = sigma.get(&pred).copied().unwrap_or(0.0);
                    let contribution = if node_sigma == 0.0 {
                        0.0
                    } else {
                        (pred_sigma / node_sigma) * (1.0 + node_delta)
                    };
                    *delta.entry(pred).or_insert(0.0) += contribution;
                }
            }
            if node != source {
                *centrality.entry(node).or_insert(0.0) += node_delta;
            }
        }
    }

    centrality
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
    fn critical_path_follows_the_longest_chain() {
        let graph = chain(&[("a", "b"), ("b", "c"), ("b", "d")]);
        let path = find_critical_path(&graph, &Metrics::new());
        assert_eq!(path, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn critical_path_is_empty_for_a_cyclic_graph() {
        let graph = chain(&[("a", "b"), ("b", "a")]);
        let metrics = Metrics::new();
        let path = find_critical_path(&graph, &metrics);
        assert!(path.is_empty());
    }

    #[test]
    fn impact_severity_matches_the_documented_thresholds() {
        // A -> B -> {C, D}, D -> E (count=3 descendants of B: C, D, E) => low.
        let graph = chain(&[("a", "b"), ("b", "c"), ("b", "d"), ("d", "e")]);
        let impact = get_impact_analysis(&graph, "b");
        assert_eq!(impact.count, 3);
        assert_eq!(impact.severity, ImpactSeverity::Low);
    }

    #[test]
    fn impact_severity_escalates_to_high_past_ten_descendants() {
        let mut edges = vec![("b", "d"), ("d", "e"), ("e", "g"), ("g", "h"), ("h", "i")];
        edges.extend([("i", "j"), ("j", "k"), ("k", "l"), ("l", "m"), ("m", "n"), ("n", "o")]);
        let graph = chain(&edges);
        let impact = get_impact_analysis(&graph, "b");
        assert_eq!(impact.count, 14);
        assert_eq!(impact.severity, ImpactSeverity::High);
    }

    #[test]
    fn a_hub_node_has_higher_betweenness_than_a_leaf() {
        let graph = chain(&[("a", "hub"), ("hub", "b"), ("c", "hub"), ("hub", "d")]);
        let ranked = get_critical_jobs(&graph, 1);
        assert_eq!(ranked.first().map(|j| j.job_id.as_str()), Some("hub"));
    }
}
