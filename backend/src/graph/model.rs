//! Arena-indexed dependency graph storage.
//!
//! Nodes and edges live in a [`petgraph::stable_graph::StableDiGraph`]; every
//! reference between them is an integer index, never an owning back-link.
//! This is the re-architecture called for in §9 of `SPEC_FULL.md` in place
//! of the original's ad-hoc object back-references, and it is what makes a
//! built graph cheap to clone into the TTL cache (decision 4, `DESIGN.md`).

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

/// Dependency relation an edge represents. Only `DependsOn` is produced by
/// this gateway's own BFS expansion; the variant is left open per §3's
/// `relation∈{DEPENDS_ON, …}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Relation {
    /// The target job must complete before the source can run.
    DependsOn,
}

/// Confidence class for an edge, in ascending strength. An edge's
/// confidence is the maximum ever observed (§3) — `Ord` backs that
/// comparison directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    /// Seen together in the same graph scope, no supporting path.
    CoOccurrence,
    /// Concluded by transitive closure over explicit edges.
    Inferred,
    /// Directly asserted, e.g. via [`super::edge_verification::VerifiedEdgeRegistry::register`].
    Explicit,
}

/// A directed edge between two jobs.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// The kind of dependency this edge represents.
    pub relation: Relation,
    /// When this edge was first observed.
    pub first_seen: DateTime<Utc>,
    /// When this edge was most recently observed.
    pub last_seen: DateTime<Utc>,
    /// Sources of evidence supporting this edge (backend call names, manual
    /// registration notes, ...).
    pub evidence: BTreeSet<String>,
    /// Strongest confidence ever observed for this edge.
    pub confidence: Confidence,
}

/// A directed dependency graph over job identifiers. Cheap to clone: the
/// underlying storage is two flat arenas plus an index map, no reference
/// cycles.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<String, GraphEdge>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Construct an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Insert `job_id` if absent, returning its index either way.
    pub fn ensure_node(&mut self, job_id: &str) -> NodeIndex {
        if let Some(index) = self.index.get(job_id) {
            return *index;
        }
        let index = self.graph.add_node(job_id.to_string());
        self.index.insert(job_id.to_string(), index);
        index
    }

    /// `true` if `job_id` is a node in this graph.
    #[must_use]
    pub fn contains(&self, job_id: &str) -> bool {
        self.index.contains_key(job_id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate every job identifier in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    /// Insert or strengthen the edge `source -> target`. Evidence is
    /// unioned; confidence only ever increases (§3 invariant); `last_seen`
    /// always advances, `first_seen` is set only on first registration.
    pub fn upsert_edge(
        &mut self,
        source: &str,
        target: &str,
        relation: Relation,
        confidence: Confidence,
        evidence: impl IntoIterator<Item = String>,
        now: DateTime<Utc>,
    ) {
        let source_index = self.ensure_node(source);
        let target_index = self.ensure_node(target);

        if let Some(edge_index) = self.graph.find_edge(source_index, target_index) {
            if let Some(edge) = self.graph.edge_weight_mut(edge_index) {
                edge.last_seen = now;
                edge.confidence = edge.confidence.max(confidence);
                edge.evidence.extend(evidence);
            }
        } else {
            self.graph.add_edge(
                source_index,
                target_index,
                GraphEdge {
                    relation,
                    first_seen: now,
                    last_seen: now,
                    evidence: evidence.into_iter().collect(),
                    confidence,
                },
            );
        }
    }

    /// Borrow the edge `source -> target`, if any.
    #[must_use]
    pub fn edge(&self, source: &str, target: &str) -> Option<&GraphEdge> {
        let source_index = *self.index.get(source)?;
        let target_index = *self.index.get(target)?;
        let edge_index = self.graph.find_edge(source_index, target_index)?;
        self.graph.edge_weight(edge_index)
    }

    /// Direct predecessors of `job_id` (nodes with an edge pointing to it).
    #[must_use]
    pub fn predecessors(&self, job_id: &str) -> Vec<String> {
        self.neighbors(job_id, Direction::Incoming)
    }

    /// Direct successors of `job_id` (nodes it has an edge pointing to).
    #[must_use]
    pub fn successors(&self, job_id: &str) -> Vec<String> {
        self.neighbors(job_id, Direction::Outgoing)
    }

    fn neighbors(&self, job_id: &str, direction: Direction) -> Vec<String> {
        let Some(&index) = self.index.get(job_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(index, direction)
            .map(|neighbor| {
                self.graph
                    .node_weight(neighbor)
                    .map(String::as_str)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    /// Borrow the underlying arena, for analyses that need petgraph's
    /// algorithms directly.
    pub(crate) fn inner(&self) -> &StableDiGraph<String, GraphEdge> {
        &self.graph
    }

    /// Node index for a job identifier, for analyses that work in index
    /// space.
    pub(crate) fn index_of(&self, job_id: &str) -> Option<NodeIndex> {
        self.index.get(job_id).copied()
    }

    /// Job identifier for a node index.
    pub(crate) fn job_at(&self, index: NodeIndex) -> Option<&str> {
        self.graph.node_weight(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_edge_unions_evidence_and_keeps_max_confidence() {
        let mut graph = DependencyGraph::new();
        let now = Utc::now();
        graph.upsert_edge(
            "a",
            "b",
            Relation::DependsOn,
            Confidence::CoOccurrence,
            ["scope-1".to_string()],
            now,
        );
        graph.upsert_edge(
            "a",
            "b",
            Relation::DependsOn,
            Confidence::Explicit,
            ["manual".to_string()],
            now,
        );

        let edge = graph.edge("a", "b").expect("edge present");
        assert_eq!(edge.confidence, Confidence::Explicit);
        assert!(edge.evidence.contains("scope-1"));
        assert!(edge.evidence.contains("manual"));
    }

    #[test]
    fn confidence_never_downgrades() {
        let mut graph = DependencyGraph::new();
        let now = Utc::now();
        graph.upsert_edge("a", "b", Relation::DependsOn, Confidence::Explicit, [], now);
        graph.upsert_edge("a", "b", Relation::DependsOn, Confidence::CoOccurrence, [], now);
        assert_eq!(graph.edge("a", "b").expect("edge").confidence, Confidence::Explicit);
    }

    #[test]
    fn predecessors_and_successors_reflect_edge_direction() {
        let mut graph = DependencyGraph::new();
        let now = Utc::now();
        graph.upsert_edge("b", "a", Relation::DependsOn, Confidence::Inferred, [], now);
        assert_eq!(graph.predecessors("a"), vec!["b".to_string()]);
        assert_eq!(graph.successors("b"), vec!["a".to_string()]);
        assert!(graph.successors("a").is_empty());
    }
}
