//! Execution (spec §3, §4.2) — the core-owned record of one attempt to run
//! a Recovery Plan end-to-end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::RecoveryPlanId;

/// Opaque identifier for an Execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DRILL launches isolated test instances (`isDrill=true`); RECOVERY is a
/// production execution (`isDrill=false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionType {
    Drill,
    Recovery,
}

impl ExecutionType {
    /// The `isDrill` flag passed to `DrsClient::start_recovery` (spec §4.3).
    pub fn is_drill(&self) -> bool {
        matches!(self, ExecutionType::Drill)
    }
}

/// Execution lifecycle status (spec §3, §4.2). Terminal states are
/// write-once (invariant 4, spec §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Partial,
}

impl ExecutionStatus {
    /// Terminal statuses admit no further transitions (spec §3, invariant 4).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::Partial
        )
    }
}

/// One attempt to run a Recovery Plan end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub plan_id: RecoveryPlanId,
    pub execution_type: ExecutionType,
    pub status: ExecutionStatus,
    pub initiated_by: String,
    pub execution_name: Option<String>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_wave_number: Option<u32>,
    /// Monotonic version used for the State Store's optimistic-concurrency
    /// CAS (spec §4.5, invariant 2).
    pub version: u64,
    pub reason_on_failure: Option<String>,
    /// Set by an accepted PAUSE command; consumed at the next inter-wave
    /// boundary (spec §4.1). Not itself a status — `status` only becomes
    /// `Paused` once the Supervisor actually suspends.
    pub pause_requested: bool,
}

impl Execution {
    /// Construct a brand-new PENDING execution (spec §4.2: `START accepted
    /// -> PENDING`).
    pub fn new_pending(
        plan_id: RecoveryPlanId,
        execution_type: ExecutionType,
        initiated_by: String,
        execution_name: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            plan_id,
            execution_type,
            status: ExecutionStatus::Pending,
            initiated_by,
            execution_name,
            description,
            start_time: now,
            end_time: None,
            current_wave_number: None,
            version: 0,
            reason_on_failure: None,
            pause_requested: false,
        }
    }
}
