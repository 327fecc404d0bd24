//! In-process reference `StateStore` (spec §4.5). Backs tests and local
//! development; a durable deployment swaps in a DynamoDB/Postgres-backed
//! implementation of the same trait without touching callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::audit::{query as audit_query, AuditQueryFilter, AuditQueryResult, AuditRecord};
use crate::domain::{
    Command, CommandId, Execution, ExecutionId, ExecutionStatus, RecoveryPlanId, ServerLaunch,
    WaveExecution,
};
use crate::error::{EngineError, Result};
use crate::store::{
    ExecutionPage, ExecutionView, ListExecutionsFilter, SortBy, SortOrder, StateStore,
};

#[derive(Default)]
pub struct InMemoryStateStore {
    executions: DashMap<ExecutionId, Execution>,
    /// Secondary index backing `has_active_execution`'s `PLAN_ALREADY_EXECUTING`
    /// guard (spec §4.5/§6.4: "indexed by (planId, status)").
    active_by_plan: DashMap<RecoveryPlanId, ExecutionId>,
    waves: DashMap<(ExecutionId, u32), WaveExecution>,
    server_launches: DashMap<(ExecutionId, u32, String), ServerLaunch>,
    commands: DashMap<CommandId, Command>,
    audit_records: Mutex<HashMap<ExecutionId, Vec<AuditRecord>>>,
    audit_sequence: DashMap<ExecutionId, AtomicU64>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_execution(
        &self,
        execution: Execution,
        waves: Vec<WaveExecution>,
    ) -> Result<()> {
        if self.active_by_plan.contains_key(&execution.plan_id) {
            return Err(EngineError::PlanAlreadyExecuting(format!(
                "plan {} already has a non-terminal execution",
                execution.plan_id
            )));
        }

        self.active_by_plan.insert(execution.plan_id, execution.id);
        for wave in waves {
            self.waves.insert((execution.id, wave.wave_number), wave);
        }
        self.executions.insert(execution.id, execution);
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>> {
        Ok(self.executions.get(&id).map(|e| e.clone()))
    }

    async fn get_execution_view(&self, id: ExecutionId) -> Result<Option<ExecutionView>> {
        let Some(execution) = self.executions.get(&id).map(|e| e.clone()) else {
            return Ok(None);
        };
        let waves = self.get_waves(id).await?;
        let mut server_launches = Vec::new();
        for wave in &waves {
            server_launches.extend(self.get_server_launches(id, wave.wave_number).await?);
        }
        Ok(Some(ExecutionView {
            execution,
            waves,
            server_launches,
        }))
    }

    async fn has_active_execution(&self, plan_id: RecoveryPlanId) -> Result<bool> {
        Ok(self.active_by_plan.contains_key(&plan_id))
    }

    async fn update_execution(
        &self,
        execution: Execution,
        expected_version: u64,
    ) -> Result<Execution> {
        let mut entry = self
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| EngineError::ExecutionNotFound(execution.id.to_string()))?;

        if entry.version != expected_version {
            return Err(EngineError::VersionConflict {
                expected: expected_version,
                found: entry.version,
            });
        }

        let mut updated = execution;
        updated.version = expected_version + 1;

        if updated.status.is_terminal() {
            self.active_by_plan.remove(&updated.plan_id);
        }

        *entry = updated.clone();
        Ok(updated)
    }

    async fn list_executions(
        &self,
        filter: ListExecutionsFilter,
        sort_by: SortBy,
        sort_order: SortOrder,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<ExecutionPage> {
        let mut matched: Vec<Execution> = self
            .executions
            .iter()
            .map(|e| e.clone())
            .filter(|e| filter.plan_id.map_or(true, |p| p == e.plan_id))
            .filter(|e| filter.status.map_or(true, |s| s == e.status))
            .filter(|e| {
                filter
                    .initiated_by
                    .as_ref()
                    .map_or(true, |who| who == &e.initiated_by)
            })
            .filter(|e| filter.since.map_or(true, |since| e.start_time >= since))
            .filter(|e| filter.until.map_or(true, |until| e.start_time <= until))
            .collect();

        let SortBy::StartTime = sort_by;
        matched.sort_by_key(|e| e.start_time);
        if sort_order == SortOrder::Descending {
            matched.reverse();
        }

        let offset = cursor
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let page: Vec<Execution> = matched.iter().skip(offset).take(limit).cloned().collect();
        let next_cursor = if offset + page.len() < matched.len() {
            Some((offset + page.len()).to_string())
        } else {
            None
        };

        Ok(ExecutionPage {
            executions: page,
            next_cursor,
        })
    }

    async fn upsert_wave(&self, wave: WaveExecution) -> Result<()> {
        self.waves.insert((wave.execution_id, wave.wave_number), wave);
        Ok(())
    }

    async fn get_waves(&self, execution_id: ExecutionId) -> Result<Vec<WaveExecution>> {
        let mut waves: Vec<WaveExecution> = self
            .waves
            .iter()
            .filter(|entry| entry.key().0 == execution_id)
            .map(|entry| entry.value().clone())
            .collect();
        waves.sort_by_key(|w| w.wave_number);
        Ok(waves)
    }

    async fn upsert_server_launch(&self, launch: ServerLaunch) -> Result<()> {
        self.server_launches.insert(
            (
                launch.execution_id,
                launch.wave_number,
                launch.source_server_id.clone(),
            ),
            launch,
        );
        Ok(())
    }

    async fn get_server_launches(
        &self,
        execution_id: ExecutionId,
        wave_number: u32,
    ) -> Result<Vec<ServerLaunch>> {
        Ok(self
            .server_launches
            .iter()
            .filter(|entry| entry.key().0 == execution_id && entry.key().1 == wave_number)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn put_command(&self, command: Command) -> Result<Command> {
        if let Some(existing) = self.commands.get(&command.id) {
            return Ok(existing.clone());
        }
        self.commands.insert(command.id, command.clone());
        Ok(command)
    }

    async fn get_command(&self, id: CommandId) -> Result<Option<Command>> {
        Ok(self.commands.get(&id).map(|c| c.clone()))
    }

    async fn append_audit_record(&self, mut record: AuditRecord) -> Result<()> {
        let counter = self
            .audit_sequence
            .entry(record.execution_id)
            .or_insert_with(|| AtomicU64::new(1));
        record.sequence = counter.fetch_add(1, Ordering::SeqCst);

        self.audit_records
            .lock()
            .entry(record.execution_id)
            .or_default()
            .push(record);
        Ok(())
    }

    async fn query_audit_records(&self, filter: AuditQueryFilter) -> Result<AuditQueryResult> {
        let guard = self.audit_records.lock();
        let records: Vec<AuditRecord> = match filter.execution_id {
            Some(execution_id) => guard
                .get(&execution_id)
                .cloned()
                .unwrap_or_default(),
            None => guard.values().flat_map(|v| v.iter().cloned()).collect(),
        };
        Ok(audit_query(&records, &filter))
    }

    async fn list_non_terminal_executions(&self) -> Result<Vec<Execution>> {
        Ok(self
            .executions
            .iter()
            .map(|e| e.clone())
            .filter(|e| !e.status.is_terminal())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionType;
    use chrono::Utc;

    fn plan_id() -> RecoveryPlanId {
        RecoveryPlanId(uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn create_execution_rejects_a_second_non_terminal_one_for_the_same_plan() {
        let store = InMemoryStateStore::new();
        let plan = plan_id();
        let first = Execution::new_pending(
            plan,
            ExecutionType::Drill,
            "alice".into(),
            None,
            None,
            Utc::now(),
        );
        store.create_execution(first, vec![]).await.unwrap();

        let second = Execution::new_pending(
            plan,
            ExecutionType::Drill,
            "bob".into(),
            None,
            None,
            Utc::now(),
        );
        let err = store.create_execution(second, vec![]).await.unwrap_err();
        assert_eq!(err.code(), "PLAN_ALREADY_EXECUTING");
    }

    #[tokio::test]
    async fn update_execution_rejects_a_stale_version() {
        let store = InMemoryStateStore::new();
        let execution = Execution::new_pending(
            plan_id(),
            ExecutionType::Drill,
            "alice".into(),
            None,
            None,
            Utc::now(),
        );
        let id = execution.id;
        store.create_execution(execution.clone(), vec![]).await.unwrap();

        let mut updated = execution.clone();
        updated.status = ExecutionStatus::Running;
        store.update_execution(updated, 0).await.unwrap();

        let mut stale = execution;
        stale.status = ExecutionStatus::Cancelled;
        let err = store.update_execution(stale, 0).await.unwrap_err();
        assert_eq!(err.code(), "VERSION_CONFLICT");

        let _ = id;
    }

    #[tokio::test]
    async fn a_terminal_update_frees_the_plan_for_a_new_execution() {
        let store = InMemoryStateStore::new();
        let plan = plan_id();
        let execution = Execution::new_pending(
            plan,
            ExecutionType::Drill,
            "alice".into(),
            None,
            None,
            Utc::now(),
        );
        store.create_execution(execution.clone(), vec![]).await.unwrap();

        let mut completed = execution;
        completed.status = ExecutionStatus::Completed;
        store.update_execution(completed, 0).await.unwrap();

        assert!(!store.has_active_execution(plan).await.unwrap());

        let next = Execution::new_pending(
            plan,
            ExecutionType::Drill,
            "bob".into(),
            None,
            None,
            Utc::now(),
        );
        store.create_execution(next, vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn put_command_is_idempotent_on_id() {
        let store = InMemoryStateStore::new();
        let cmd = Command::new(
            None,
            crate::domain::CommandKind::TerminateInstances,
            "alice".into(),
            Utc::now(),
        );
        let first = store.put_command(cmd.clone()).await.unwrap();

        let mut replay = cmd;
        replay.requested_by = "mallory".into();
        let second = store.put_command(replay).await.unwrap();

        assert_eq!(first.requested_by, second.requested_by);
    }

    #[tokio::test]
    async fn audit_records_get_monotonic_sequence_numbers_per_execution() {
        let store = InMemoryStateStore::new();
        let execution_id = ExecutionId::new();
        for _ in 0..3 {
            store
                .append_audit_record(AuditRecord::new(
                    execution_id,
                    0,
                    crate::audit::AuditSeverity::Info,
                    crate::audit::AuditRecordKind::CommandAccepted {
                        command_id: CommandId::new(),
                    },
                    Utc::now(),
                ))
                .await
                .unwrap();
        }

        let result = store
            .query_audit_records(AuditQueryFilter::for_execution(execution_id))
            .await
            .unwrap();
        let sequences: Vec<u64> = result.records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
