//! # State Store Adapter
//!
//! All Execution/WaveExecution/ServerLaunch writes go through this adapter
//! (spec §4.5). It is the only authoritative store of mutable execution
//! state; in-memory caches held elsewhere are advisory and re-validated on
//! CAS failure (spec §5). `memory` provides an in-process reference
//! implementation; a durable backend (DynamoDB, Postgres, ...) implements
//! the same trait.

pub mod memory;

use async_trait::async_trait;

use crate::audit::{AuditQueryFilter, AuditQueryResult, AuditRecord};
use crate::domain::{
    Command, CommandId, Execution, ExecutionId, ExecutionStatus, RecoveryPlanId, ServerLaunch,
    WaveExecution,
};
use crate::error::Result;

/// Sort field for `ListExecutions` (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    StartTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Filters accepted by `ListExecutions` (spec §6.1).
#[derive(Debug, Clone, Default)]
pub struct ListExecutionsFilter {
    pub plan_id: Option<RecoveryPlanId>,
    pub status: Option<ExecutionStatus>,
    pub initiated_by: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

/// A cursor-paginated page of executions (SPEC_FULL.md §B).
#[derive(Debug, Clone)]
pub struct ExecutionPage {
    pub executions: Vec<Execution>,
    pub next_cursor: Option<String>,
}

/// Full rollup returned by `GetExecution` (spec §6.1, §7: "always returns a
/// consistent view including wave statuses, per-server error messages").
#[derive(Debug, Clone)]
pub struct ExecutionView {
    pub execution: Execution,
    pub waves: Vec<WaveExecution>,
    pub server_launches: Vec<ServerLaunch>,
}

/// Read/write access to Execution/Wave/ServerLaunch/Command/AuditRecord
/// state (spec §4.5, §6.4). Every mutating method takes the caller's
/// expected `version` and fails with `EngineError::VersionConflict` if it
/// does not match the stored value (spec §8 invariant 2).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a brand-new execution together with its PENDING wave rows,
    /// rejecting with `PlanAlreadyExecuting` if a non-terminal execution
    /// already exists for `execution.plan_id` (spec §4.1, §8 invariant 1).
    async fn create_execution(
        &self,
        execution: Execution,
        waves: Vec<WaveExecution>,
    ) -> Result<()>;

    /// Consistent-read fetch by id (spec §4.5: "control-plane decisions").
    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>>;

    /// Full rollup for `GetExecution` (spec §6.1).
    async fn get_execution_view(&self, id: ExecutionId) -> Result<Option<ExecutionView>>;

    /// Whether a non-terminal execution exists for `plan_id` (spec §4.1's
    /// `PLAN_ALREADY_EXECUTING` guard, backed by the (planId, status) index
    /// named in spec §4.5/§6.4).
    async fn has_active_execution(&self, plan_id: RecoveryPlanId) -> Result<bool>;

    /// CAS update: succeeds only if the stored version equals
    /// `expected_version`, then persists `execution` with `version + 1`.
    async fn update_execution(
        &self,
        execution: Execution,
        expected_version: u64,
    ) -> Result<Execution>;

    async fn list_executions(
        &self,
        filter: ListExecutionsFilter,
        sort_by: SortBy,
        sort_order: SortOrder,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<ExecutionPage>;

    async fn upsert_wave(&self, wave: WaveExecution) -> Result<()>;
    async fn get_waves(&self, execution_id: ExecutionId) -> Result<Vec<WaveExecution>>;

    async fn upsert_server_launch(&self, launch: ServerLaunch) -> Result<()>;
    async fn get_server_launches(
        &self,
        execution_id: ExecutionId,
        wave_number: u32,
    ) -> Result<Vec<ServerLaunch>>;

    /// Persist a command, idempotent on `command.id` (spec §4.5, §8
    /// invariant 3). Returns the already-persisted command unchanged if
    /// `command.id` was seen before.
    async fn put_command(&self, command: Command) -> Result<Command>;
    async fn get_command(&self, id: CommandId) -> Result<Option<Command>>;

    /// Append one audit record, assigning the next sequence number for
    /// `execution_id` (spec §4.5, §6.4).
    async fn append_audit_record(&self, record: AuditRecord) -> Result<()>;
    async fn query_audit_records(&self, filter: AuditQueryFilter) -> Result<AuditQueryResult>;

    /// Non-terminal executions to rehydrate a Supervisor for on process
    /// restart (spec §5).
    async fn list_non_terminal_executions(&self) -> Result<Vec<Execution>>;
}
