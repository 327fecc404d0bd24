// # Common Types and Traits
//
// Shared types used across the engine: `HealthStatus`/`HealthSnapshot` back
// `Supervisor::health_snapshot` (spec §B.4); the bounded LRU map backs the
// credential cache (spec §4.6).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health status of a component, surfaced by the process's readiness
/// endpoint (spec §B.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Engine-wide readiness snapshot returned by `Supervisor::health_snapshot`
/// (spec §B.4): how many executions the process currently has in flight and
/// how stale the oldest in-flight DRS poll is. `status` degrades to
/// `Unhealthy` once the oldest poll has been outstanding longer than the
/// poller's configured `max_job_lifetime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub active_executions: usize,
    pub oldest_in_flight_poll_age: Option<Duration>,
}

pub mod bounded_map;
pub use bounded_map::BoundedHashMap;
