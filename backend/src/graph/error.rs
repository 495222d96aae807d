//! Error type for the dependency-graph service (C6).

use thiserror::Error;

/// Error raised while building or serving a dependency graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The root job of a BFS expansion could not be reached at all —
    /// partial-expansion failures elsewhere in the traversal are logged
    /// and swallowed (§4.6), but an unreachable root fails the whole call.
    #[error("root job '{job_id}' is unreachable")]
    RootUnreachable {
        /// The job identifier the caller asked to expand from.
        job_id: String,
    },
}
