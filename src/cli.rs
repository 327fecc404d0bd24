//! # DRS Orchestrator CLI
//!
//! One-shot scenario runner used to exercise the engine without a running
//! server process: each invocation builds a fresh in-memory State Store and
//! demo Repository/DrsClient, starts one execution against the requested
//! scenario, drives it through the Supervisor to completion, and prints the
//! resulting execution/wave rows as JSON.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use drs_orchestrator::clock::{SuspendGateRegistry, SystemClock};
use drs_orchestrator::config::EngineConfig;
use drs_orchestrator::credentials::CredentialCache;
use drs_orchestrator::demo::{build_scenario, DemoCredentialProvider, DemoDrsClient, Scenario};
use drs_orchestrator::domain::ExecutionType;
use drs_orchestrator::gateway::{CommandGateway, StartExecutionRequest};
use drs_orchestrator::poller::JobPoller;
use drs_orchestrator::store::memory::InMemoryStateStore;
use drs_orchestrator::store::StateStore;
use drs_orchestrator::supervisor::Supervisor;
use drs_orchestrator::wave_runner::WaveRunner;
use drs_orchestrator::Result;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioArg {
    SingleWave,
    DependentWaves,
    PauseBeforeSecondWave,
    FailingFirstWave,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::SingleWave => Scenario::SingleWave,
            ScenarioArg::DependentWaves => Scenario::DependentWaves,
            ScenarioArg::PauseBeforeSecondWave => Scenario::PauseBeforeSecondWave,
            ScenarioArg::FailingFirstWave => Scenario::FailingFirstWave,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExecutionTypeArg {
    Drill,
    Recovery,
}

impl From<ExecutionTypeArg> for ExecutionType {
    fn from(arg: ExecutionTypeArg) -> Self {
        match arg {
            ExecutionTypeArg::Drill => ExecutionType::Drill,
            ExecutionTypeArg::Recovery => ExecutionType::Recovery,
        }
    }
}

/// Run a Recovery Plan scenario end-to-end against an in-memory engine.
#[derive(Debug, Parser)]
#[command(name = "drs-orchestrator-cli", version, about)]
struct Args {
    /// Which sample Recovery Plan shape to execute.
    #[arg(long, value_enum, default_value = "single-wave")]
    scenario: ScenarioArg,

    /// DRILL launches isolated test instances; RECOVERY is a production run.
    #[arg(long, value_enum, default_value = "drill")]
    execution_type: ExecutionTypeArg,

    /// Who to record as the command's requester in the audit trail.
    #[arg(long, default_value = "cli-user")]
    requested_by: String,

    /// Pause a `pause-before-second-wave` scenario once it reaches PAUSED,
    /// then immediately resume it, to demonstrate the pause/resume path.
    #[arg(long)]
    exercise_pause: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = EngineConfig::default();
    let (repository, plan_id) = build_scenario(args.scenario.into());
    let fail_servers = repository.fail_servers.lock().clone();
    let repository = Arc::new(repository);
    let plan = repository
        .plans
        .lock()
        .get(&plan_id)
        .cloned()
        .expect("just seeded");

    let store = Arc::new(InMemoryStateStore::new());
    let credentials = Arc::new(CredentialCache::new(
        Arc::new(DemoCredentialProvider),
        &config.credential_cache,
    ));
    let drs = Arc::new(DemoDrsClient::new(fail_servers));
    let clock = Arc::new(SystemClock);

    let poller = Arc::new(JobPoller::new(
        drs.clone(),
        store.clone(),
        credentials,
        clock.clone(),
        config.poller.clone(),
    ));
    let wave_runner = Arc::new(WaveRunner::new(
        repository.clone(),
        drs.clone(),
        store.clone(),
        poller.clone(),
        config.concurrency.clone(),
    ));
    let gates = SuspendGateRegistry::new();
    let supervisor = Arc::new(Supervisor::new(
        store.clone(),
        repository.clone(),
        wave_runner,
        poller.clone(),
        clock,
        gates.clone(),
    ));
    let gateway = CommandGateway::new(store.clone(), repository.clone(), drs.clone(), gates);

    let execution = gateway
        .start_execution(
            &plan,
            StartExecutionRequest {
                plan_id: plan.id,
                execution_type: args.execution_type.into(),
                execution_name: Some(format!("{:?}", args.scenario)),
                description: None,
                requested_by: args.requested_by.clone(),
            },
        )
        .await?;

    if args.exercise_pause {
        let gateway = gateway;
        let execution_id = execution.id;
        let requested_by = args.requested_by.clone();
        let supervisor_for_pause = supervisor.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                if supervisor_for_pause.gate(execution_id).is_paused() {
                    // `resume_execution` signals the shared gate itself now;
                    // no need to also poke it here.
                    let _ = gateway
                        .resume_execution(execution_id, requested_by.clone(), None)
                        .await;
                    break;
                }
                if supervisor_for_pause.gate(execution_id).is_cancelled() {
                    break;
                }
            }
        });
    }

    let final_execution = supervisor.run(execution.id).await?;
    let view = store
        .get_execution_view(final_execution.id)
        .await?
        .expect("execution was just driven by this process");

    let report = serde_json::to_string_pretty(&ExecutionReport::from(view))
        .map_err(|e| drs_orchestrator::EngineError::Internal(format!("serializing report: {e}")))?;
    println!("{report}");

    Ok(())
}

#[derive(serde::Serialize)]
struct ExecutionReport {
    execution: drs_orchestrator::domain::Execution,
    waves: Vec<drs_orchestrator::domain::WaveExecution>,
    server_launches: Vec<drs_orchestrator::domain::ServerLaunch>,
}

impl From<drs_orchestrator::store::ExecutionView> for ExecutionReport {
    fn from(view: drs_orchestrator::store::ExecutionView) -> Self {
        Self {
            execution: view.execution,
            waves: view.waves,
            server_launches: view.server_launches,
        }
    }
}
