//! # Execution Supervisor
//!
//! One Supervisor task runs per non-terminal Execution (spec §4.2, §5):
//! a single-threaded control loop that is the only mutator of that
//! Execution's `status`, scheduling waves against the plan's dependency
//! DAG, observing pause/cancel, and deriving the Execution's terminal
//! outcome from its waves' outcomes.
//!
//! Multiple Supervisors run independently in parallel tasks — nothing here
//! is process-wide mutable state except the `SuspendGate` registry used to
//! deliver PAUSE/RESUME/CANCEL to a running control loop.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::clock::{Clock, SuspendGate, SuspendGateRegistry};
use crate::domain::{
    Execution, ExecutionId, ExecutionStatus, ProtectionGroup, RecoveryPlan, ServerLaunchStatus,
    WaveExecution, WaveStatus,
};
use crate::error::{EngineError, Result};
use crate::orchestration::{DependencyEdge, DependencyGraph, DependencyNode, DependencyType};
use crate::poller::JobPoller;
use crate::repository::Repository;
use crate::store::StateStore;
use crate::wave_runner::WaveRunner;

/// How long the control loop sleeps between checks of an in-flight wave's
/// ServerLaunch rows while waiting for the Job Poller to settle them.
const WAVE_SETTLE_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Drives one Execution's control loop end-to-end (spec §4.2).
pub struct Supervisor {
    store: Arc<dyn StateStore>,
    repository: Arc<dyn Repository>,
    wave_runner: Arc<WaveRunner>,
    poller: Arc<JobPoller>,
    clock: Arc<dyn Clock>,
    gates: Arc<SuspendGateRegistry>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn StateStore>,
        repository: Arc<dyn Repository>,
        wave_runner: Arc<WaveRunner>,
        poller: Arc<JobPoller>,
        clock: Arc<dyn Clock>,
        gates: Arc<SuspendGateRegistry>,
    ) -> Self {
        Self {
            store,
            repository,
            wave_runner,
            poller,
            clock,
            gates,
        }
    }

    /// The suspend gate a `CommandGateway` pause/resume/cancel acceptance
    /// should signal for this execution (created on first use). Backed by
    /// the same registry the gateway holds, so a signal sent there is
    /// observed here without any extra plumbing.
    pub fn gate(&self, execution_id: ExecutionId) -> Arc<SuspendGate> {
        self.gates.gate(execution_id)
    }

    /// Readiness snapshot for the process's health endpoint (SPEC_FULL.md
    /// §B): how many executions are currently non-terminal, and how long
    /// the oldest in-flight Job Poller entry has been outstanding. Degrades
    /// to `Unhealthy` once that age exceeds the poller's `max_job_lifetime`.
    pub async fn health_snapshot(&self) -> Result<crate::common::HealthSnapshot> {
        let active_executions = self.store.list_non_terminal_executions().await?.len();
        let oldest_age = self
            .poller
            .oldest_tracked_job_age(self.clock.now())
            .and_then(|age| age.to_std().ok());

        let overdue = oldest_age
            .map(|age| age > self.poller.max_job_lifetime())
            .unwrap_or(false);
        let status = if overdue {
            crate::common::HealthStatus::Unhealthy
        } else {
            crate::common::HealthStatus::Healthy
        };

        Ok(crate::common::HealthSnapshot {
            status,
            active_executions,
            oldest_in_flight_poll_age: oldest_age,
        })
    }

    /// Drive `execution_id` from its current (non-terminal) status to a
    /// terminal one. Safe to call again after a process restart — it
    /// re-derives progress from persisted WaveExecution/ServerLaunch rows
    /// (spec §5: "restart rehydrates from the State Store").
    pub async fn run(&self, execution_id: ExecutionId) -> Result<Execution> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        let plan = self
            .repository
            .get_recovery_plan(execution.plan_id)
            .await?
            .ok_or_else(|| EngineError::InvalidRequest(format!("plan {} not found", execution.plan_id)))?;

        if execution.status == ExecutionStatus::Pending {
            execution = self
                .transition(execution_id, ExecutionStatus::Running, |e| {
                    e.start_time = Utc::now();
                })
                .await?;
        }

        let gate = self.gate(execution_id);
        let order = schedule_order(&plan)?;
        let mut wave_statuses: HashMap<u32, WaveStatus> = self
            .store
            .get_waves(execution_id)
            .await?
            .into_iter()
            .map(|w| (w.wave_number, w.status))
            .collect();

        for wave_number in order {
            if gate.is_cancelled() {
                break;
            }

            if wave_statuses.get(&wave_number).copied().unwrap_or(WaveStatus::Pending).is_terminal() {
                continue;
            }

            let spec = plan
                .wave(wave_number)
                .expect("schedule_order only yields wave numbers present in the plan");

            if dependency_failed(&spec.depends_on, &wave_statuses) {
                let wave = WaveExecution {
                    execution_id,
                    wave_number,
                    status: WaveStatus::Skipped,
                    start_time: None,
                    end_time: Some(Utc::now()),
                    server_count: 0,
                };
                self.store.upsert_wave(wave).await?;
                wave_statuses.insert(wave_number, WaveStatus::Skipped);
                continue;
            }

            if spec.pause_before_wave || gate.is_paused() {
                execution = self
                    .transition(execution_id, ExecutionStatus::Paused, |e| {
                        e.pause_requested = false;
                    })
                    .await?;
                gate.pause();
                gate.wait_while_paused().await;

                if gate.is_cancelled() {
                    break;
                }
                execution = self
                    .transition(execution_id, ExecutionStatus::Running, |_| {})
                    .await?;
            }

            if gate.is_cancelled() {
                break;
            }

            execution.current_wave_number = Some(wave_number);
            let group = self
                .repository
                .get_protection_group(spec.group_id)
                .await?
                .ok_or_else(|| {
                    EngineError::InvalidRequest(format!("group {} not found", spec.group_id))
                })?;

            let already_launched = wave_statuses
                .get(&wave_number)
                .copied()
                .unwrap_or(WaveStatus::Pending)
                != WaveStatus::Pending;

            if already_launched {
                // A prior run of this control loop (this process or one
                // before a restart) already issued Start-Recovery for this
                // wave's servers; re-register its in-flight jobs with this
                // Job Poller instance instead of launching again (spec §5,
                // §8 scenario S6: "no duplicate Start-Recovery calls").
                self.rehydrate_tracking(execution_id, wave_number, &group)
                    .await?;
            } else {
                let wave = WaveExecution::new_pending(execution_id, wave_number);
                self.wave_runner
                    .run(
                        wave,
                        &group,
                        execution_id.to_string(),
                        execution.execution_type.is_drill(),
                    )
                    .await?;
            }

            let final_status = self.await_wave_settlement(execution_id, wave_number, &gate).await?;
            wave_statuses.insert(wave_number, final_status);
        }

        let outcome = derive_outcome(&wave_statuses, gate.is_cancelled());
        execution = self
            .transition(execution_id, outcome, |e| {
                e.end_time = Some(Utc::now());
                if outcome == ExecutionStatus::Failed {
                    e.reason_on_failure = Some("one or more waves failed".to_string());
                }
            })
            .await?;

        Ok(execution)
    }

    /// Re-register a still-LAUNCHING ServerLaunch's DRS job with the Job
    /// Poller without re-issuing Start-Recovery. Needed because the poller's
    /// in-flight job table is in-memory only (spec §5); a fresh process
    /// resuming an Execution from persisted state has an empty table even
    /// though the DRS jobs it's waiting on are still running.
    async fn rehydrate_tracking(
        &self,
        execution_id: ExecutionId,
        wave_number: u32,
        group: &ProtectionGroup,
    ) -> Result<()> {
        let launches = self.store.get_server_launches(execution_id, wave_number).await?;
        for launch in launches {
            if launch.status != ServerLaunchStatus::Launching {
                continue;
            }
            if let Some(job_id) = launch.drs_job_id {
                self.poller.track(
                    execution_id,
                    wave_number,
                    launch.source_server_id,
                    job_id,
                    group.target_account_id.clone(),
                    group.region.clone(),
                );
            }
        }
        Ok(())
    }

    async fn await_wave_settlement(
        &self,
        execution_id: ExecutionId,
        wave_number: u32,
        gate: &SuspendGate,
    ) -> Result<WaveStatus> {
        loop {
            let launches = self.store.get_server_launches(execution_id, wave_number).await?;
            if let Some(status) = WaveExecution::aggregate(&launches) {
                let mut wave = self
                    .store
                    .get_waves(execution_id)
                    .await?
                    .into_iter()
                    .find(|w| w.wave_number == wave_number)
                    .unwrap_or_else(|| WaveExecution::new_pending(execution_id, wave_number));
                wave.status = status;
                wave.end_time = Some(Utc::now());
                self.store.upsert_wave(wave).await?;
                return Ok(status);
            }

            if gate.is_cancelled() {
                warn!(%execution_id, wave_number, "cancellation observed while wave still in flight; draining in-flight launches");
            }

            self.clock.sleep(WAVE_SETTLE_POLL_INTERVAL).await;
            let _ = self.poller.poll_once().await;
        }
    }

    /// Re-fetch `execution_id`'s current row and CAS it to `status`. Always
    /// reads fresh rather than trusting a caller-held copy, since an
    /// external `CommandGateway` write (PAUSE/CANCEL) may have bumped
    /// `version` since this control loop last read the row.
    async fn transition(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        apply: impl FnOnce(&mut Execution),
    ) -> Result<Execution> {
        let current = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        let from = current.status;
        let expected_version = current.version;
        let mut updated = current;
        updated.status = status;
        apply(&mut updated);

        let updated = self.store.update_execution(updated, expected_version).await?;
        self.store
            .append_audit_record(crate::audit::AuditRecord::new(
                updated.id,
                0,
                crate::audit::AuditSeverity::Info,
                crate::audit::AuditRecordKind::ExecutionStatusChanged { from, to: status },
                Utc::now(),
            ))
            .await?;
        info!(execution_id = %updated.id, ?from, to = ?status, "execution status changed");
        Ok(updated)
    }
}

/// Build the plan's dependency DAG and return wave numbers in an order
/// where every wave's dependencies precede it (spec §4.2: "build a DAG from
/// dependsOn").
fn schedule_order(plan: &RecoveryPlan) -> Result<Vec<u32>> {
    let mut graph = DependencyGraph::new();
    for wave in &plan.waves {
        graph.add_node(DependencyNode::new(wave.wave_number.to_string(), wave.wave_number.to_string()))?;
    }
    for wave in &plan.waves {
        for &dep in &wave.depends_on {
            graph.add_edge(DependencyEdge::new(
                wave.wave_number.to_string(),
                dep.to_string(),
                DependencyType::Hard,
            ))?;
        }
    }

    let order: Vec<u32> = graph
        .topological_sort()?
        .into_iter()
        .map(|id| id.parse().expect("wave ids are always u32 strings"))
        .collect();
    Ok(order)
}

/// A wave is skipped if any of its dependencies ended FAILED (spec §4.2:
/// "if any dependency is FAILED, dependent waves are marked SKIPPED").
fn dependency_failed(depends_on: &[u32], statuses: &HashMap<u32, WaveStatus>) -> bool {
    depends_on.iter().any(|dep| {
        matches!(
            statuses.get(dep),
            Some(WaveStatus::Failed) | Some(WaveStatus::Skipped)
        )
    })
}

/// Derive the Execution's terminal status from its waves' outcomes (spec
/// §4.2's state table).
fn derive_outcome(statuses: &HashMap<u32, WaveStatus>, cancelled: bool) -> ExecutionStatus {
    if cancelled {
        return ExecutionStatus::Cancelled;
    }

    let relevant: Vec<&WaveStatus> = statuses
        .values()
        .filter(|s| !matches!(s, WaveStatus::Skipped))
        .collect();

    if relevant.is_empty() || relevant.iter().all(|s| **s == WaveStatus::Completed) {
        ExecutionStatus::Completed
    } else if relevant.iter().all(|s| **s == WaveStatus::Failed) {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Partial
    }
}
