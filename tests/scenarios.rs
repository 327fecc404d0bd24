//! End-to-end scenario tests (spec §8 S1-S6), driving the Command Gateway,
//! Execution Supervisor, Wave Runner, and Job Poller together over an
//! `InMemoryStateStore`, exactly as an embedder would wire them in
//! production. `FakeClock`'s no-op `sleep` keeps the Supervisor's
//! inter-wave-settlement polling loop from costing any real wall-clock
//! time; zeroing the poller's `initial_delay`/`backoff_base` keeps jobs
//! "due" on the first tick instead of waiting on `FakeClock::advance`.

use std::sync::Arc;
use std::time::Duration;

use drs_orchestrator::clock::{Clock, SuspendGateRegistry};
use drs_orchestrator::config::{ConcurrencyConfig, CredentialCacheConfig, PollerConfig};
use drs_orchestrator::credentials::CredentialCache;
use drs_orchestrator::domain::{
    ExecutionStatus, ExecutionType, LaunchConfig, LaunchDisposition, LicensingMode,
    ProtectionGroup, ProtectionGroupId, RecoveryPlan, RecoveryPlanId, RightSizingMethod,
    ServerLaunchStatus, ServerSelection, WaveSpec, WaveStatus,
};
use drs_orchestrator::drs::DrsClient;
use drs_orchestrator::gateway::{CommandGateway, StartExecutionRequest};
use drs_orchestrator::poller::JobPoller;
use drs_orchestrator::store::memory::InMemoryStateStore;
use drs_orchestrator::store::StateStore;
use drs_orchestrator::supervisor::Supervisor;
use drs_orchestrator::testing::{
    FakeClock, FakeCredentialProvider, FakeDrsClient, FakeRepository, ScriptedDrsClient,
};
use drs_orchestrator::wave_runner::WaveRunner;
use uuid::Uuid;

fn group(servers: &[&str]) -> ProtectionGroup {
    ProtectionGroup {
        id: ProtectionGroupId(Uuid::new_v4()),
        name: "group".into(),
        target_account_id: "123456789012".into(),
        region: "us-east-1".into(),
        server_selection: ServerSelection::Explicit(servers.iter().map(|s| s.to_string()).collect()),
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

fn zero_delay_poller_config() -> PollerConfig {
    PollerConfig {
        initial_delay: Duration::ZERO,
        backoff_base: Duration::ZERO,
        ..PollerConfig::default()
    }
}

/// Wire a Gateway + Supervisor (and the Job Poller backing it) over
/// `store`, sharing `repository`/`drs` with whatever else the test needs.
fn wire(
    store: Arc<InMemoryStateStore>,
    repository: Arc<FakeRepository>,
    drs: Arc<dyn DrsClient>,
) -> (CommandGateway, Arc<Supervisor>) {
    let clock = FakeClock::new();
    let credentials = Arc::new(CredentialCache::new(
        Arc::new(FakeCredentialProvider),
        &CredentialCacheConfig::default(),
    ));
    let poller = Arc::new(JobPoller::new(
        drs.clone(),
        store.clone(),
        credentials,
        clock.clone() as Arc<dyn Clock>,
        zero_delay_poller_config(),
    ));
    let wave_runner = Arc::new(WaveRunner::new(
        repository.clone(),
        drs.clone(),
        store.clone(),
        poller.clone(),
        ConcurrencyConfig::default(),
    ));
    let gates = SuspendGateRegistry::new();
    let supervisor = Arc::new(Supervisor::new(
        store.clone(),
        repository.clone(),
        wave_runner,
        poller,
        clock,
        gates.clone(),
    ));
    let gateway = CommandGateway::new(store, repository, drs, gates);
    (gateway, supervisor)
}

async fn start(
    gateway: &CommandGateway,
    plan: &RecoveryPlan,
    requested_by: &str,
) -> drs_orchestrator::domain::Execution {
    gateway
        .start_execution(
            plan,
            StartExecutionRequest {
                plan_id: plan.id,
                execution_type: ExecutionType::Drill,
                execution_name: None,
                description: None,
                requested_by: requested_by.to_string(),
            },
        )
        .await
        .unwrap()
}

/// S1 — Linear 3-wave drill, all succeed.
#[tokio::test]
async fn s1_linear_three_wave_drill_all_succeed() {
    let g1 = group(&["s-1"]);
    let g2 = group(&["s-2"]);
    let g3 = group(&["s-3"]);
    let plan = RecoveryPlan {
        id: RecoveryPlanId(Uuid::new_v4()),
        name: "linear".into(),
        waves: vec![
            WaveSpec { wave_number: 1, group_id: g1.id, pause_before_wave: false, depends_on: vec![] },
            WaveSpec { wave_number: 2, group_id: g2.id, pause_before_wave: false, depends_on: vec![1] },
            WaveSpec { wave_number: 3, group_id: g3.id, pause_before_wave: false, depends_on: vec![2] },
        ],
    };
    let repository = Arc::new(
        FakeRepository::new()
            .with_group(g1)
            .with_group(g2)
            .with_group(g3)
            .with_plan(plan.clone()),
    );
    let drs: Arc<dyn DrsClient> = Arc::new(FakeDrsClient::new());
    let store = Arc::new(InMemoryStateStore::new());
    let (gateway, supervisor) = wire(store.clone(), repository, drs);

    let execution = start(&gateway, &plan, "alice").await;
    let result = tokio::time::timeout(Duration::from_secs(5), supervisor.run(execution.id))
        .await
        .expect("supervisor should settle without real waiting")
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);

    let waves = store.get_waves(execution.id).await.unwrap();
    assert_eq!(waves.len(), 3);
    for wave in &waves {
        assert_eq!(wave.status, WaveStatus::Completed);
    }

    let health = supervisor.health_snapshot().await.unwrap();
    assert_eq!(health.active_executions, 0);
    assert_eq!(health.status, drs_orchestrator::common::HealthStatus::Healthy);
}

/// S2 — Pause-before-wave then resume.
#[tokio::test]
async fn s2_pause_before_wave_then_resume() {
    let g1 = group(&["s-1"]);
    let g2 = group(&["s-2"]);
    let plan = RecoveryPlan {
        id: RecoveryPlanId(Uuid::new_v4()),
        name: "pause".into(),
        waves: vec![
            WaveSpec { wave_number: 1, group_id: g1.id, pause_before_wave: false, depends_on: vec![] },
            WaveSpec { wave_number: 2, group_id: g2.id, pause_before_wave: true, depends_on: vec![1] },
        ],
    };
    let repository = Arc::new(
        FakeRepository::new().with_group(g1).with_group(g2).with_plan(plan.clone()),
    );
    let drs: Arc<dyn DrsClient> = Arc::new(FakeDrsClient::new());
    let store = Arc::new(InMemoryStateStore::new());
    let (gateway, supervisor) = wire(store, repository, drs);

    let execution = start(&gateway, &plan, "alice").await;
    let execution_id = execution.id;

    let run_supervisor = supervisor.clone();
    let handle = tokio::spawn(async move { run_supervisor.run(execution_id).await });

    let gate = supervisor.gate(execution_id);
    tokio::time::timeout(Duration::from_secs(5), async {
        while !gate.is_paused() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("execution should pause before wave 2");

    gateway
        .resume_execution(execution_id, "alice".to_string(), None)
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor should finish after resume")
        .unwrap()
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
}

/// S3 — Partial wave: one server launches, one fails.
#[tokio::test]
async fn s3_partial_wave_on_mixed_outcomes() {
    let g1 = group(&["s-1", "s-2"]);
    let plan = RecoveryPlan {
        id: RecoveryPlanId(Uuid::new_v4()),
        name: "partial".into(),
        waves: vec![WaveSpec { wave_number: 1, group_id: g1.id, pause_before_wave: false, depends_on: vec![] }],
    };
    let repository = Arc::new(FakeRepository::new().with_group(g1).with_plan(plan.clone()));
    let drs = Arc::new(ScriptedDrsClient::new().with_failing(["s-2".to_string()]));
    let drs_dyn: Arc<dyn DrsClient> = drs.clone();
    let store = Arc::new(InMemoryStateStore::new());
    let (gateway, supervisor) = wire(store.clone(), repository, drs_dyn);

    let execution = start(&gateway, &plan, "alice").await;
    let execution_id = execution.id;

    let run_supervisor = supervisor.clone();
    let handle = tokio::spawn(async move { run_supervisor.run(execution_id).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while drs.job_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("wave 1 should have issued its Start-Recovery job");
    drs.complete_all();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor should settle once the job completes")
        .unwrap()
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Partial);

    let launches = store.get_server_launches(execution_id, 1).await.unwrap();
    let failed = launches.iter().find(|l| l.source_server_id == "s-2").unwrap();
    assert_eq!(failed.status, ServerLaunchStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("scripted failure"));
    let launched = launches.iter().find(|l| l.source_server_id == "s-1").unwrap();
    assert_eq!(launched.status, ServerLaunchStatus::Launched);
}

/// S4 — Cancel mid-poll: three servers in flight, none terminal yet.
#[tokio::test]
async fn s4_cancel_mid_poll_drains_to_cancelled() {
    let g1 = group(&["s-1", "s-2", "s-3"]);
    let plan = RecoveryPlan {
        id: RecoveryPlanId(Uuid::new_v4()),
        name: "cancel".into(),
        waves: vec![WaveSpec { wave_number: 1, group_id: g1.id, pause_before_wave: false, depends_on: vec![] }],
    };
    let repository = Arc::new(FakeRepository::new().with_group(g1).with_plan(plan.clone()));
    let drs = Arc::new(ScriptedDrsClient::new());
    let drs_dyn: Arc<dyn DrsClient> = drs.clone();
    let store = Arc::new(InMemoryStateStore::new());
    let (gateway, supervisor) = wire(store.clone(), repository, drs_dyn);

    let execution = start(&gateway, &plan, "alice").await;
    let execution_id = execution.id;

    let run_supervisor = supervisor.clone();
    let handle = tokio::spawn(async move { run_supervisor.run(execution_id).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let launches = store.get_server_launches(execution_id, 1).await.unwrap();
            if launches.len() == 3
                && launches.iter().all(|l| l.status == ServerLaunchStatus::Launching)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("all three servers should reach POLLING before cancel arrives");

    gateway
        .cancel_execution(execution_id, "alice".to_string(), Some("operator abort".into()))
        .await
        .unwrap();

    // Let the in-flight jobs settle so the control loop can observe a
    // terminal wave and finish draining (spec §4.4: in-flight polls
    // continue to terminal even after cancellation is observed).
    drs.complete_all();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor should drain to CANCELLED")
        .unwrap()
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Cancelled);
}

/// S5 — Dependency failure skips downstream.
#[tokio::test]
async fn s5_dependency_failure_skips_downstream_wave() {
    let g1 = group(&["s-1"]);
    let g2 = group(&["s-2"]);
    let plan = RecoveryPlan {
        id: RecoveryPlanId(Uuid::new_v4()),
        name: "skip".into(),
        waves: vec![
            WaveSpec { wave_number: 1, group_id: g1.id, pause_before_wave: false, depends_on: vec![] },
            WaveSpec { wave_number: 2, group_id: g2.id, pause_before_wave: false, depends_on: vec![1] },
        ],
    };
    let repository = Arc::new(
        FakeRepository::new().with_group(g1).with_group(g2).with_plan(plan.clone()),
    );
    let drs = Arc::new(ScriptedDrsClient::new().with_failing(["s-1".to_string()]));
    let drs_dyn: Arc<dyn DrsClient> = drs.clone();
    let store = Arc::new(InMemoryStateStore::new());
    let (gateway, supervisor) = wire(store.clone(), repository, drs_dyn);

    let execution = start(&gateway, &plan, "alice").await;
    let execution_id = execution.id;

    let run_supervisor = supervisor.clone();
    let handle = tokio::spawn(async move { run_supervisor.run(execution_id).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while drs.job_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("wave 1 should have issued its Start-Recovery job");
    drs.complete_all();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor should settle once wave 1 fails")
        .unwrap()
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    let waves = store.get_waves(execution_id).await.unwrap();
    let wave1 = waves.iter().find(|w| w.wave_number == 1).unwrap();
    let wave2 = waves.iter().find(|w| w.wave_number == 2).unwrap();
    assert_eq!(wave1.status, WaveStatus::Failed);
    assert_eq!(wave2.status, WaveStatus::Skipped);
    assert_eq!(drs.job_count(), 1, "wave 2's server should never have been launched");
}

/// S6 — Restart mid-execution: a fresh Supervisor/Job Poller pair resumes
/// an Execution whose wave 2 already has a LAUNCHING ServerLaunch, without
/// re-issuing Start-Recovery for it.
#[tokio::test]
async fn s6_restart_mid_execution_resumes_without_relaunching() {
    let g1 = group(&["s-1"]);
    let g2 = group(&["s-2"]);
    let plan = RecoveryPlan {
        id: RecoveryPlanId(Uuid::new_v4()),
        name: "restart".into(),
        waves: vec![
            WaveSpec { wave_number: 1, group_id: g1.id, pause_before_wave: false, depends_on: vec![] },
            WaveSpec { wave_number: 2, group_id: g2.id, pause_before_wave: false, depends_on: vec![1] },
        ],
    };
    let repository = Arc::new(
        FakeRepository::new().with_group(g1).with_group(g2).with_plan(plan.clone()),
    );
    let drs = Arc::new(ScriptedDrsClient::new());
    let drs_dyn: Arc<dyn DrsClient> = drs.clone();
    let store = Arc::new(InMemoryStateStore::new());

    let (gateway, supervisor_before) = wire(store.clone(), repository.clone(), drs_dyn.clone());
    let execution = start(&gateway, &plan, "alice").await;
    let execution_id = execution.id;

    let handle_before = tokio::spawn(async move { supervisor_before.run(execution_id).await });

    // Wave 1 launches, then completes; wave 2 launches and is left hanging
    // (simulating the process dying while its job is still in flight).
    tokio::time::timeout(Duration::from_secs(5), async {
        while drs.job_count() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    drs.complete_all();

    tokio::time::timeout(Duration::from_secs(5), async {
        while drs.job_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("wave 2 should have issued its Start-Recovery job");

    handle_before.abort();
    let _ = handle_before.await;

    let launches = store.get_server_launches(execution_id, 2).await.unwrap();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].status, ServerLaunchStatus::Launching);
    assert!(launches[0].drs_job_id.is_some());

    // The external DRS service has since reported wave 2's job terminal;
    // a brand new Supervisor/Job Poller pair (empty in-memory job table)
    // resumes against the same persisted state.
    drs.complete_all();
    let (_gateway_after, supervisor_after) = wire(store.clone(), repository, drs_dyn);

    let result = tokio::time::timeout(Duration::from_secs(5), supervisor_after.run(execution_id))
        .await
        .expect("restarted supervisor should settle")
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(
        drs.job_count(),
        2,
        "restart must not re-issue Start-Recovery for an already-launched server"
    );
}
