//! Negation (set-difference) queries (§4.6 point 2, §8 property 8).

use std::collections::HashSet;

use super::analysis::descendants;
use super::model::DependencyGraph;

/// Jobs unaffected by `failing_job`: every node except `failing_job` itself
/// and its descendants.
#[must_use]
pub fn find_safe_jobs(graph: &DependencyGraph, failing_job: &str) -> Vec<String> {
    let affected: HashSet<String> = descendants(graph, failing_job).into_iter().collect();
    graph
        .nodes()
        .filter(|node| *node != failing_job && !affected.contains(*node))
        .map(str::to_string)
        .collect()
}

/// Jobs with no directed path to or from `resource` in the graph.
#[must_use]
pub fn find_independent_jobs(graph: &DependencyGraph, resource: &str) -> Vec<String> {
    if !graph.contains(resource) {
        return graph.nodes().map(str::to_string).collect();
    }
    let reachable_from_resource: HashSet<String> = descendants(graph, resource).into_iter().collect();
    let reachable_to_resource: HashSet<String> = super::analysis::ancestors(graph, resource).into_iter().collect();

    graph
        .nodes()
        .filter(|node| {
            *node != resource
                && !reachable_from_resource.contains(*node)
                && !reachable_to_resource.contains(*node)
        })
        .map(str::to_string)
        .collect()
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
    fn safe_jobs_exclude_the_failing_job_and_its_descendants() {
        let graph = chain(&[("a", "b"), ("b", "c"), ("x", "y")]);
        let safe = find_safe_jobs(&graph, "b");
        assert!(!safe.contains(&"b".to_string()));
        assert!(!safe.contains(&"c".to_string()));
        assert!(safe.contains(&"x".to_string()));
        assert!(safe.contains(&"y".to_string()));
    }

    #[test]
    fn independent_jobs_have_no_path_to_or_from_the_resource() {
        let graph = chain(&[("a", "b"), ("b", "c"), ("x", "y")]);
        let independent = find_independent_jobs(&graph, "b");
        assert!(independent.contains(&"x".to_string()));
        assert!(independent.contains(&"y".to_string()));
        assert!(!independent.contains(&"a".to_string()));
        assert!(!independent.contains(&"c".to_string()));
    }

    #[test]
    fn unknown_resource_treats_every_job_as_independent() {
        let graph = chain(&[("a", "b")]);
        let independent = find_independent_jobs(&graph, "missing");
        assert_eq!(independent.len(), 2);
    }
}
