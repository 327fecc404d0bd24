//! # DRS Orchestrator Server
//!
//! Reference entry point wiring the Command Gateway, Execution Supervisor,
//! Wave Runner, and Job Poller together over the in-memory State Store
//! (spec §5). A real deployment swaps `InMemoryStateStore`, `demo::*`'s
//! Repository/CredentialProvider/DrsClient for durable/AWS-backed
//! implementations of the same traits; nothing above the `store`/`drs`/
//! `repository`/`credentials` seams needs to change.

use std::sync::Arc;
use std::time::Duration;

use drs_orchestrator::clock::{SuspendGateRegistry, SystemClock};
use drs_orchestrator::config::EngineConfig;
use drs_orchestrator::credentials::CredentialCache;
use drs_orchestrator::demo::{build_scenario, DemoCredentialProvider, DemoDrsClient, Scenario};
use drs_orchestrator::domain::ExecutionType;
use drs_orchestrator::gateway::{CommandGateway, StartExecutionRequest};
use drs_orchestrator::poller::JobPoller;
use drs_orchestrator::store::memory::InMemoryStateStore;
use drs_orchestrator::supervisor::Supervisor;
use drs_orchestrator::wave_runner::WaveRunner;
use drs_orchestrator::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("starting drs-orchestrator server");

    let config = EngineConfig::default();
    let (repository, plan_id) = build_scenario(Scenario::DependentWaves);
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

    // The Job Poller is a shared pool servicing every tracked job across
    // every execution (spec §5); a real service keeps this ticking for the
    // process lifetime rather than stopping once the demo execution settles.
    let ticker_poller = poller.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if let Err(e) = ticker_poller.poll_once().await {
                error!(error = %e, "poll tick failed");
            }
        }
    });

    let execution = gateway
        .start_execution(
            &plan,
            StartExecutionRequest {
                plan_id: plan.id,
                execution_type: ExecutionType::Drill,
                execution_name: Some("startup self-check".to_string()),
                description: Some("runs once on process start to confirm wiring".to_string()),
                requested_by: "drs-orchestrator-server".to_string(),
            },
        )
        .await?;

    info!(execution_id = %execution.id, "execution accepted, handing to supervisor");
    let final_execution = supervisor.run(execution.id).await?;
    info!(
        execution_id = %final_execution.id,
        status = ?final_execution.status,
        "execution reached a terminal status"
    );

    ticker.abort();
    Ok(())
}
