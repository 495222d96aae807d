//! TWS dependency-graph service (C6): on-demand BFS graph construction
//! over the read-only backend plus the four advanced queries described in
//! §4.6 — temporal state-at-time, negation, common-neighbor intersection,
//! and edge verification.

mod analysis;
mod common_neighbor;
mod edge_verification;
mod error;
mod model;
mod negation;
mod service;
mod temporal;

pub use analysis::{
    ancestors, descendants, get_dependency_chain, get_critical_jobs, get_impact_analysis,
    find_critical_path, ChainDirection, CriticalJob, ImpactAnalysis, ImpactSeverity,
};
pub use common_neighbor::{
    check_resource_conflict, find_shared_bottlenecks, ConflictRisk, ResourceConflict,
};
pub use edge_verification::{verify_dependency, VerificationResult, VerifiedEdgeRegistry};
pub use error::GraphError;
pub use model::{Confidence, DependencyGraph, GraphEdge, Relation};
pub use negation::{find_independent_jobs, find_safe_jobs};
pub use service::{CacheStats, GraphService};
pub use temporal::{StatusAtTime, TemporalEvent, TemporalStore, UnknownStatus};
