//! Edge verification: the advanced query that prevents a hallucinated link
//! from being treated as a real dependency (§4.6 point 4, §8 property 9).
//!
//! Verified edges are tracked in a registry independent of any one built
//! [`super::model::DependencyGraph`] snapshot, because graphs are rebuilt
//! from the backend on every cache miss (§4.6 step 3-4) while a manual
//! verification must survive that rebuild.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::model::DependencyGraph;

/// Confidence classes returned by [`verify_dependency`], in descending
/// strength.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Directly registered via [`VerifiedEdgeRegistry::register`].
    Explicit {
        /// Evidence supplied across all registrations of this edge.
        evidence: BTreeSet<String>,
    },
    /// Concluded by transitive closure over explicit edges only.
    Inferred {
        /// One explicit-edge path from `source` to `target`.
        path: Vec<String>,
    },
    /// Both jobs appear in the same graph scope with no supporting path.
    CoOccurrence,
    /// Neither registered, derivable, nor co-occurring.
    Unknown,
}

/// Process-wide registry of explicitly verified dependency edges.
pub struct VerifiedEdgeRegistry {
    edges: Mutex<HashMap<(String, String), BTreeSet<String>>>,
}

impl VerifiedEdgeRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            edges: Mutex::new(HashMap::new()),
        }
    }

    /// Register `source -> target` as an explicit, human/system-verified
    /// dependency, unioning `evidence` into whatever was already recorded.
    /// Once registered, an edge never loses its `EXPLICIT` status — there
    /// is no corresponding "unregister".
    pub fn register(&self, source: &str, target: &str, evidence: impl IntoIterator<Item = String>) {
        let mut edges = self.lock();
        edges
            .entry((source.to_string(), target.to_string()))
            .or_default()
            .extend(evidence);
    }

    /// Evidence recorded for `source -> target`, if it was ever registered.
    #[must_use]
    pub fn evidence_for(&self, source: &str, target: &str) -> Option<BTreeSet<String>> {
        self.lock().get(&(source.to_string(), target.to_string())).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), BTreeSet<String>>> {
        self.edges.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn explicit_successors(&self, node: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(source, _)| source == node)
            .map(|(_, target)| target.clone())
            .collect()
    }
}

impl Default for VerifiedEdgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `source -> target` against the explicit registry, the explicit
/// transitive closure, and graph co-occurrence, in that order of strength.
#[must_use]
pub fn verify_dependency(
    graph: &DependencyGraph,
    registry: &VerifiedEdgeRegistry,
    source: &str,
    target: &str,
) -> VerificationResult {
    if let Some(evidence) = registry.evidence_for(source, target) {
        return VerificationResult::Explicit { evidence };
    }

    if let Some(path) = explicit_path(registry, source, target) {
        return VerificationResult::Inferred { path };
    }

    if graph.contains(source) && graph.contains(target) {
        return VerificationResult::CoOccurrence;
    }

    VerificationResult::Unknown
}

/// Breadth-first search over the registry's explicit edges only, returning
/// the first path found from `source` to `target`.
fn explicit_path(registry: &VerifiedEdgeRegistry, source: &str, target: &str) -> Option<Vec<String>> {
    if source == target {
        return None;
    }
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    let mut parent: HashMap<String, String> = HashMap::new();
    queue.push_back(source.to_string());
    visited.insert(source.to_string());

    while let Some(node) = queue.pop_front() {
        for next in registry.explicit_successors(&node) {
            if visited.contains(&next) {
                continue;
            }
            parent.insert(next.clone(), node.clone());
            if next == target {
                return Some(reconstruct_path(&parent, source, target));
            }
            visited.insert(next.clone());
            queue.push_back(next);
        }
    }
    None
}

fn reconstruct_path(parent: &HashMap<String, String>, source: &str, target: &str) -> Vec<String> {
    let mut path = vec![target.to_string()];
    let mut current = target;
    while current != source {
        let Some(prev) = parent.get(current) else {
            break;
        };
        path.push(prev.clone());
        current = prev.as_str();
    }
    path.reverse();
    path
}
