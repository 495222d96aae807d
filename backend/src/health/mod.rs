//! Health orchestrator (C8): parallel component probes, overall-status
//! aggregation, bounded history, and best-effort recovery.

mod history;
mod orchestrator;
mod probe;
mod recovery;

pub use history::{HealthHistory, HealthHistoryEntry};
pub use orchestrator::{HealthCheckResult, HealthOrchestrator, StatusSummary};
pub use probe::{
    CacheHierarchyProbe, ComponentHealth, ConnectionPoolsProbe, CpuProbe, FileSystemProbe,
    HealthProbe, HealthStatus, MemoryProbe, TwsMonitorProbe, UnwiredProbe, CACHE_HIERARCHY,
    CONNECTION_POOLS, CPU, CRITICAL_COMPONENTS, DATABASE, FILE_SYSTEM, MEMORY, REDIS, TWS_MONITOR,
    WEBSOCKET_POOL,
};
pub use recovery::{attempt_component_recovery, RecoveryResult};
