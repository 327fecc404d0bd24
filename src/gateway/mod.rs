//! # Command Gateway
//!
//! The only entry point external callers use to affect an Execution (spec
//! §4.1, §6.1). Every command is validated against the current Execution
//! row's status before being persisted; accepted commands advance the
//! Execution's `version` via the State Store's optimistic-concurrency CAS,
//! so concurrent commands on one execution are totally ordered (spec §8
//! invariant 2).
//!
//! The Supervisor owns turning an accepted command into actual work
//! (running the control loop, draining in-flight waves); this module
//! decides accept/reject, persists the result, and signals the shared
//! `SuspendGate` so a running Supervisor control loop actually observes
//! PAUSE/RESUME/CANCEL instead of only seeing it on its next store read.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{AuditRecord, AuditRecordKind, AuditSeverity};
use crate::clock::SuspendGateRegistry;
use crate::domain::{
    Command, CommandKind, Execution, ExecutionId, ExecutionStatus, ExecutionType, RecoveryPlan,
    RecoveryPlanId,
};
use crate::drs::{CallScope, DrsClient, TerminateJob};
use crate::error::{EngineError, Result};
use crate::repository::Repository;
use crate::store::StateStore;

/// Request to start a new execution of a plan (spec §6.1).
#[derive(Debug, Clone)]
pub struct StartExecutionRequest {
    pub plan_id: RecoveryPlanId,
    pub execution_type: ExecutionType,
    pub execution_name: Option<String>,
    pub description: Option<String>,
    pub requested_by: String,
}

/// Accepts, validates, and persists control commands against the current
/// Execution state (spec §4.1).
pub struct CommandGateway {
    store: Arc<dyn StateStore>,
    repository: Arc<dyn Repository>,
    drs: Arc<dyn DrsClient>,
    gates: Arc<SuspendGateRegistry>,
}

impl CommandGateway {
    pub fn new(
        store: Arc<dyn StateStore>,
        repository: Arc<dyn Repository>,
        drs: Arc<dyn DrsClient>,
        gates: Arc<SuspendGateRegistry>,
    ) -> Self {
        Self {
            store,
            repository,
            drs,
            gates,
        }
    }

    /// `START` (spec §4.1, §6.1): rejects with `PlanAlreadyExecuting` if a
    /// non-terminal execution already exists for the plan; otherwise
    /// creates a PENDING Execution plus its PENDING WaveExecutions.
    pub async fn start_execution(
        &self,
        plan: &RecoveryPlan,
        request: StartExecutionRequest,
    ) -> Result<Execution> {
        plan.validate()?;

        if self.store.has_active_execution(request.plan_id).await? {
            return Err(EngineError::PlanAlreadyExecuting(format!(
                "plan {} already has a non-terminal execution",
                request.plan_id
            )));
        }

        let now = Utc::now();
        let execution = Execution::new_pending(
            request.plan_id,
            request.execution_type,
            request.requested_by.clone(),
            request.execution_name,
            request.description,
            now,
        );
        let waves = plan
            .waves
            .iter()
            .map(|w| crate::domain::WaveExecution::new_pending(execution.id, w.wave_number))
            .collect();

        self.store
            .create_execution(execution.clone(), waves)
            .await?;

        let command = Command::new(
            Some(execution.id),
            CommandKind::StartExecution {
                plan_id: request.plan_id,
                execution_type: request.execution_type,
                execution_name: execution.execution_name.clone(),
                description: execution.description.clone(),
            },
            request.requested_by,
            now,
        );
        self.store.put_command(command.clone()).await?;
        self.record_accepted(execution.id, command.id, now).await?;

        Ok(execution)
    }

    /// `PAUSE` (spec §4.1): accepted only if RUNNING, setting the
    /// pause-requested flag the Supervisor consumes at the next inter-wave
    /// boundary; idempotent if already PAUSED.
    pub async fn pause_execution(
        &self,
        execution_id: ExecutionId,
        requested_by: String,
        reason: Option<String>,
    ) -> Result<Execution> {
        let execution = self.load(execution_id).await?;

        if execution.status == ExecutionStatus::Paused {
            return Ok(execution);
        }
        if execution.status != ExecutionStatus::Running {
            return self
                .reject(
                    execution_id,
                    requested_by,
                    reason,
                    CommandKind::PauseExecution { reason: None },
                    format!("cannot pause execution in status {:?}", execution.status),
                )
                .await;
        }

        let expected_version = execution.version;
        let mut updated = execution;
        updated.pause_requested = true;
        let updated = self.store.update_execution(updated, expected_version).await?;

        self.accept_command(
            execution_id,
            requested_by,
            CommandKind::PauseExecution { reason },
        )
        .await?;
        self.gates.gate(execution_id).pause();
        Ok(updated)
    }

    /// `RESUME` (spec §4.1): accepted only if PAUSED.
    pub async fn resume_execution(
        &self,
        execution_id: ExecutionId,
        requested_by: String,
        notes: Option<String>,
    ) -> Result<Execution> {
        let execution = self.load(execution_id).await?;

        if execution.status != ExecutionStatus::Paused {
            return self
                .reject(
                    execution_id,
                    requested_by,
                    notes,
                    CommandKind::ResumeExecution { notes: None },
                    format!("cannot resume execution in status {:?}", execution.status),
                )
                .await;
        }

        self.accept_command(
            execution_id,
            requested_by,
            CommandKind::ResumeExecution { notes },
        )
        .await?;
        self.gates.gate(execution_id).resume();
        Ok(execution)
    }

    /// `CANCEL` (spec §4.1): accepted if PENDING/RUNNING/PAUSED; transitions
    /// to CANCELLING. The Supervisor drives CANCELLING -> CANCELLED once
    /// in-flight waves settle.
    pub async fn cancel_execution(
        &self,
        execution_id: ExecutionId,
        requested_by: String,
        reason: Option<String>,
    ) -> Result<Execution> {
        let execution = self.load(execution_id).await?;

        let cancellable = matches!(
            execution.status,
            ExecutionStatus::Pending | ExecutionStatus::Running | ExecutionStatus::Paused
        );
        if !cancellable {
            return self
                .reject(
                    execution_id,
                    requested_by,
                    reason,
                    CommandKind::CancelExecution { reason: None },
                    format!("cannot cancel execution in status {:?}", execution.status),
                )
                .await;
        }

        let expected_version = execution.version;
        let mut updated = execution;
        let from = updated.status;
        updated.status = ExecutionStatus::Cancelling;
        let updated = self.store.update_execution(updated, expected_version).await?;

        self.accept_command(
            execution_id,
            requested_by,
            CommandKind::CancelExecution { reason },
        )
        .await?;
        self.record_status_change(execution_id, from, ExecutionStatus::Cancelling)
            .await?;
        self.gates.gate(execution_id).cancel();
        Ok(updated)
    }

    /// `TERMINATE_INSTANCES` (spec §4.1, §6.1): accepted only once an
    /// execution has settled into a terminal outcome; gathers every
    /// recovery instance this execution launched and issues one bulk DRS
    /// Terminate-Recovery-Instances job for them, persisting the returned
    /// `terminateJobId` as a side execution record (spec §4.1, §6.4 — there
    /// is no dedicated terminate-job table, so the audit log carries it).
    pub async fn terminate_instances(
        &self,
        execution_id: ExecutionId,
        requested_by: String,
    ) -> Result<TerminateJob> {
        let execution = self.load(execution_id).await?;

        let eligible = matches!(
            execution.status,
            ExecutionStatus::Completed
                | ExecutionStatus::Partial
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
        );
        if !eligible {
            return self
                .reject(
                    execution_id,
                    requested_by,
                    None,
                    CommandKind::TerminateInstances,
                    format!(
                        "cannot terminate instances for execution in status {:?}",
                        execution.status
                    ),
                )
                .await;
        }

        let (scope, recovery_instance_ids) = self.collect_recovery_instances(&execution).await?;
        let Some(scope) = scope else {
            return self
                .reject(
                    execution_id,
                    requested_by,
                    None,
                    CommandKind::TerminateInstances,
                    "execution has no launched recovery instances to terminate".to_string(),
                )
                .await;
        };

        let job = self
            .drs
            .terminate_recovery_instances(&scope, &recovery_instance_ids)
            .await?;

        self.accept_command(execution_id, requested_by, CommandKind::TerminateInstances)
            .await?;
        self.store
            .append_audit_record(AuditRecord::new(
                execution_id,
                0,
                AuditSeverity::Info,
                AuditRecordKind::InstancesTerminationRequested {
                    terminate_job_id: job.terminate_job_id.clone(),
                    recovery_instance_ids,
                },
                Utc::now(),
            ))
            .await?;
        Ok(job)
    }

    /// Every recovery instance id launched by `execution`'s waves, plus the
    /// account/region scope to terminate them in (taken from the first wave
    /// that contributed an instance, mirroring how `WaveRunner::run`
    /// resolves one scope per wave).
    async fn collect_recovery_instances(
        &self,
        execution: &Execution,
    ) -> Result<(Option<CallScope>, Vec<String>)> {
        let plan = self
            .repository
            .get_recovery_plan(execution.plan_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution.id.to_string()))?;

        let mut scope = None;
        let mut recovery_instance_ids = Vec::new();
        for wave in &plan.waves {
            let launches = self
                .store
                .get_server_launches(execution.id, wave.wave_number)
                .await?;
            let ids: Vec<String> = launches
                .into_iter()
                .filter_map(|l| l.recovery_instance_id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            if scope.is_none() {
                if let Some(group) = self.repository.get_protection_group(wave.group_id).await? {
                    scope = Some(CallScope {
                        account_id: group.target_account_id,
                        region: group.region,
                    });
                }
            }
            recovery_instance_ids.extend(ids);
        }

        Ok((scope, recovery_instance_ids))
    }

    async fn load(&self, execution_id: ExecutionId) -> Result<Execution> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))
    }

    async fn accept_command(
        &self,
        execution_id: ExecutionId,
        requested_by: String,
        kind: CommandKind,
    ) -> Result<()> {
        let now = Utc::now();
        let mut command = Command::new(Some(execution_id), kind, requested_by, now);
        command.accepted_at = Some(now);
        let command = self.store.put_command(command).await?;
        self.record_accepted(execution_id, command.id, now).await
    }

    async fn reject<T>(
        &self,
        execution_id: ExecutionId,
        requested_by: String,
        _unused: Option<String>,
        kind: CommandKind,
        reason: String,
    ) -> Result<T> {
        let now = Utc::now();
        let mut command = Command::new(Some(execution_id), kind, requested_by, now);
        command.rejected_reason = Some(reason.clone());
        let command = self.store.put_command(command).await?;

        self.store
            .append_audit_record(AuditRecord::new(
                execution_id,
                0,
                AuditSeverity::Warning,
                AuditRecordKind::CommandRejected {
                    command_id: command.id,
                    reason: reason.clone(),
                },
                now,
            ))
            .await?;

        Err(EngineError::InvalidRequest(reason))
    }

    async fn record_accepted(
        &self,
        execution_id: ExecutionId,
        command_id: crate::domain::CommandId,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .append_audit_record(AuditRecord::new(
                execution_id,
                0,
                AuditSeverity::Info,
                AuditRecordKind::CommandAccepted { command_id },
                now,
            ))
            .await
    }

    async fn record_status_change(
        &self,
        execution_id: ExecutionId,
        from: ExecutionStatus,
        to: ExecutionStatus,
    ) -> Result<()> {
        self.store
            .append_audit_record(AuditRecord::new(
                execution_id,
                0,
                AuditSeverity::Info,
                AuditRecordKind::ExecutionStatusChanged { from, to },
                Utc::now(),
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SuspendGateRegistry;
    use crate::domain::{
        LaunchConfig, LaunchDisposition, LicensingMode, ProtectionGroup, ProtectionGroupId,
        RightSizingMethod, ServerLaunch, ServerLaunchStatus, ServerSelection, WaveSpec,
    };
    use crate::store::memory::InMemoryStateStore;
    use crate::testing::{FakeDrsClient, FakeRepository};
    use uuid::Uuid;

    fn group() -> ProtectionGroup {
        ProtectionGroup {
            id: ProtectionGroupId(Uuid::new_v4()),
            name: "g".into(),
            target_account_id: "123456789012".into(),
            region: "us-east-1".into(),
            server_selection: ServerSelection::Explicit(vec!["s-1".into()]),
            launch_config: LaunchConfig {
                subnet_id: None,
                security_group_ids: vec![],
                instance_type: None,
                iam_instance_profile: None,
                copy_tags: true,
                copy_private_ip: true,
                licensing: LicensingMode::NoLicenseConfiguration,
                right_sizing_method: RightSizingMethod::Basic,
                launch_disposition: LaunchDisposition::Started,
            },
        }
    }

    fn plan(group_id: ProtectionGroupId) -> RecoveryPlan {
        RecoveryPlan {
            id: RecoveryPlanId(Uuid::new_v4()),
            name: "p".into(),
            waves: vec![WaveSpec {
                wave_number: 1,
                group_id,
                pause_before_wave: false,
                depends_on: vec![],
            }],
        }
    }

    fn gateway(plan: &RecoveryPlan, group: &ProtectionGroup) -> (CommandGateway, Arc<InMemoryStateStore>) {
        let store = Arc::new(InMemoryStateStore::new());
        let repository = Arc::new(
            FakeRepository::new()
                .with_plan(plan.clone())
                .with_group(group.clone()),
        );
        let drs: Arc<dyn DrsClient> = Arc::new(FakeDrsClient::new());
        let gates = SuspendGateRegistry::new();
        (
            CommandGateway::new(store.clone(), repository, drs, gates),
            store,
        )
    }

    #[tokio::test]
    async fn start_execution_rejects_a_second_concurrent_run_of_the_same_plan() {
        let group = group();
        let plan = plan(group.id);
        let (gateway, _store) = gateway(&plan, &group);
        let request = StartExecutionRequest {
            plan_id: plan.id,
            execution_type: ExecutionType::Drill,
            execution_name: None,
            description: None,
            requested_by: "alice".into(),
        };
        gateway.start_execution(&plan, request.clone()).await.unwrap();
        let err = gateway.start_execution(&plan, request).await.unwrap_err();
        assert_eq!(err.code(), "PLAN_ALREADY_EXECUTING");
    }

    #[tokio::test]
    async fn pause_is_rejected_unless_running() {
        let group = group();
        let plan = plan(group.id);
        let (gateway, _store) = gateway(&plan, &group);
        let execution = gateway
            .start_execution(
                &plan,
                StartExecutionRequest {
                    plan_id: plan.id,
                    execution_type: ExecutionType::Drill,
                    execution_name: None,
                    description: None,
                    requested_by: "alice".into(),
                },
            )
            .await
            .unwrap();

        let err = gateway
            .pause_execution(execution.id, "alice".into(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn pause_signals_the_shared_gate_so_a_running_supervisor_would_observe_it() {
        let group = group();
        let plan = plan(group.id);
        let (gateway, store) = gateway(&plan, &group);
        let execution = gateway
            .start_execution(
                &plan,
                StartExecutionRequest {
                    plan_id: plan.id,
                    execution_type: ExecutionType::Drill,
                    execution_name: None,
                    description: None,
                    requested_by: "alice".into(),
                },
            )
            .await
            .unwrap();

        let mut running = store.get_execution(execution.id).await.unwrap().unwrap();
        let expected_version = running.version;
        running.status = ExecutionStatus::Running;
        store.update_execution(running, expected_version).await.unwrap();

        gateway
            .pause_execution(execution.id, "alice".into(), None)
            .await
            .unwrap();
        assert!(gateway.gates.gate(execution.id).is_paused());

        gateway
            .resume_execution(execution.id, "alice".into(), None)
            .await
            .unwrap();
        assert!(!gateway.gates.gate(execution.id).is_paused());
    }

    #[tokio::test]
    async fn cancel_transitions_running_to_cancelling_and_signals_the_gate() {
        let group = group();
        let plan = plan(group.id);
        let (gateway, store) = gateway(&plan, &group);
        let execution = gateway
            .start_execution(
                &plan,
                StartExecutionRequest {
                    plan_id: plan.id,
                    execution_type: ExecutionType::Drill,
                    execution_name: None,
                    description: None,
                    requested_by: "alice".into(),
                },
            )
            .await
            .unwrap();

        let mut running = store.get_execution(execution.id).await.unwrap().unwrap();
        let expected_version = running.version;
        running.status = ExecutionStatus::Running;
        store.update_execution(running, expected_version).await.unwrap();

        let cancelled = gateway
            .cancel_execution(execution.id, "alice".into(), Some("operator abort".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelling);
        assert!(gateway.gates.gate(execution.id).is_cancelled());
    }

    #[tokio::test]
    async fn terminate_instances_requires_a_terminal_execution() {
        let group = group();
        let plan = plan(group.id);
        let (gateway, _store) = gateway(&plan, &group);
        let execution = gateway
            .start_execution(
                &plan,
                StartExecutionRequest {
                    plan_id: plan.id,
                    execution_type: ExecutionType::Drill,
                    execution_name: None,
                    description: None,
                    requested_by: "alice".into(),
                },
            )
            .await
            .unwrap();

        let err = gateway
            .terminate_instances(execution.id, "alice".into())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn terminate_instances_issues_a_bulk_drs_job_and_records_it() {
        let group = group();
        let plan = plan(group.id);
        let (gateway, store) = gateway(&plan, &group);
        let execution = gateway
            .start_execution(
                &plan,
                StartExecutionRequest {
                    plan_id: plan.id,
                    execution_type: ExecutionType::Drill,
                    execution_name: None,
                    description: None,
                    requested_by: "alice".into(),
                },
            )
            .await
            .unwrap();

        let mut launch = ServerLaunch::new_pending(execution.id, 1, "s-1".to_string());
        launch.status = ServerLaunchStatus::Launched;
        launch.recovery_instance_id = Some("i-s-1".to_string());
        store.upsert_server_launch(launch).await.unwrap();

        let mut completed = store.get_execution(execution.id).await.unwrap().unwrap();
        let expected_version = completed.version;
        completed.status = ExecutionStatus::Completed;
        store.update_execution(completed, expected_version).await.unwrap();

        let job = gateway
            .terminate_instances(execution.id, "alice".into())
            .await
            .unwrap();
        assert_eq!(job.terminate_job_id, "term-i-s-1");
    }
}
