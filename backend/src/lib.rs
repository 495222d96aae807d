#![cfg_attr(
    test,
    expect(clippy::expect_used, reason = "tests require contextual panics")
)]
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]
//! Read-only gateway fronting an enterprise Workload Automation REST
//! backend: resilience primitives, a process metrics registry, a two-tier
//! cache hierarchy, a read-only backend client, an LLM fallback service, a
//! TWS dependency-graph service, a proactive poller, and a health
//! orchestrator.

pub mod backend_client;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod health;
pub mod llm;
pub mod metrics;
pub mod observability;
pub mod poller;
pub mod resilience;

pub use error::{Error, ErrorCode};
