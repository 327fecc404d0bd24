//! # Wave Runner
//!
//! Drives one WaveExecution from PENDING to a terminal status (spec §4.3):
//! resolve the group's member servers, enforce capacity limits, fan out
//! Start-Recovery calls bounded by a per-account concurrency limit, and
//! hand the resulting DRS jobs to the Job Poller. The Supervisor owns
//! sequencing waves against the plan's dependency DAG; this module only
//! knows how to run a single wave to completion.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};

use crate::config::ConcurrencyConfig;
use crate::domain::{
    LaunchConfig, ProtectionGroup, ServerLaunch, ServerLaunchStatus, ServerSelection,
    SourceServerId, WaveExecution, WaveStatus,
};
use crate::drs::{CallScope, DrsClient, SourceServerFilter};
use crate::error::{EngineError, Result};
use crate::poller::JobPoller;
use crate::repository::{Repository, TagSelector};
use crate::store::StateStore;

/// Maximum servers in a single wave (spec §4.3).
pub const MAX_WAVE_SIZE: usize = 100;

/// Drives one wave to completion (spec §4.3).
pub struct WaveRunner {
    repository: Arc<dyn Repository>,
    drs: Arc<dyn DrsClient>,
    store: Arc<dyn StateStore>,
    poller: Arc<JobPoller>,
    concurrency: ConcurrencyConfig,
}

impl WaveRunner {
    pub fn new(
        repository: Arc<dyn Repository>,
        drs: Arc<dyn DrsClient>,
        store: Arc<dyn StateStore>,
        poller: Arc<JobPoller>,
        concurrency: ConcurrencyConfig,
    ) -> Self {
        Self {
            repository,
            drs,
            store,
            poller,
            concurrency,
        }
    }

    /// Resolve members, launch, and persist ServerLaunch rows; registers
    /// each launched job with the Job Poller by leaving its ServerLaunch in
    /// LAUNCHING/POLLING state for the poller to pick up. Returns the
    /// wave's status as of the end of the fan-out step — POLLING if any
    /// launch succeeded, terminal (FAILED/PARTIAL) if every server failed
    /// to launch up front.
    pub async fn run(
        &self,
        mut wave: WaveExecution,
        group: &ProtectionGroup,
        execution_id_tag: String,
        is_drill: bool,
    ) -> Result<WaveExecution> {
        wave.status = WaveStatus::Launching;
        wave.start_time = Some(Utc::now());
        self.store.upsert_wave(wave.clone()).await?;

        let servers = self.resolve_servers(group).await?;
        if servers.is_empty() {
            return Err(EngineError::NoMatchingServers(wave.wave_number));
        }
        if servers.len() > MAX_WAVE_SIZE {
            return Err(EngineError::WaveSizeLimitExceeded(servers.len()));
        }

        wave.server_count = servers.len();
        self.store.upsert_wave(wave.clone()).await?;

        let scope = CallScope {
            account_id: group.target_account_id.clone(),
            region: group.region.clone(),
        };

        self.launch_all(
            &wave,
            &scope,
            &servers,
            &group.launch_config,
            execution_id_tag,
            is_drill,
        )
        .await?;

        wave.status = WaveStatus::Polling;
        self.store.upsert_wave(wave.clone()).await?;
        Ok(wave)
    }

    async fn resolve_servers(&self, group: &ProtectionGroup) -> Result<Vec<SourceServerId>> {
        match &group.server_selection {
            ServerSelection::Explicit(ids) => Ok(ids.clone()),
            ServerSelection::TagExpression(expr) => {
                let (key, value) = expr
                    .split_once('=')
                    .ok_or_else(|| EngineError::InvalidRequest(format!("bad tag expression: {expr}")))?;
                let selector = TagSelector {
                    key: key.to_string(),
                    value: value.to_string(),
                };
                self.repository
                    .resolve_servers_by_tag(&group.target_account_id, &group.region, &selector)
                    .await
            }
        }
    }

    async fn launch_all(
        &self,
        wave: &WaveExecution,
        scope: &CallScope,
        servers: &[SourceServerId],
        launch_config: &LaunchConfig,
        execution_id_tag: String,
        is_drill: bool,
    ) -> Result<()> {
        let limit = self.concurrency.max_concurrent_launches_per_account.max(1);
        let mut tags = HashMap::new();
        tags.insert("ExecutionId".to_string(), execution_id_tag);
        // `launch_config` is not a Start-Recovery parameter: DRS applies
        // subnet/SG/instance-type/IAM-profile/licensing per source server
        // ahead of time, out of band (see domain::protection_group's doc
        // comment). `launch_config` is accepted here only so a future
        // per-server "launch action" (DRS's `UpdateLaunchConfiguration`)
        // has somewhere to read it from; Start-Recovery itself ignores it.
        let _ = launch_config;

        let mut chunks = servers.chunks(limit);
        while let Some(chunk) = chunks.next() {
            let mut pending = FuturesUnordered::new();
            for server_id in chunk {
                let server_id = server_id.clone();
                let tags = tags.clone();
                pending.push(async move {
                    let result = self
                        .drs
                        .start_recovery(scope, std::slice::from_ref(&server_id), is_drill, tags)
                        .await;
                    (server_id, result)
                });
            }

            while let Some((server_id, result)) = pending.next().await {
                let mut launch = ServerLaunch::new_pending(
                    wave.execution_id,
                    wave.wave_number,
                    server_id.clone(),
                );
                match result {
                    Ok(job) => {
                        launch.drs_job_id = Some(job.job_id.clone());
                        launch.status = ServerLaunchStatus::Launching;
                        self.poller.track(
                            wave.execution_id,
                            wave.wave_number,
                            server_id.clone(),
                            job.job_id,
                            scope.account_id.clone(),
                            scope.region.clone(),
                        );
                    }
                    Err(e) => {
                        launch.fail(e.code(), e.to_string());
                    }
                }
                self.store.upsert_server_launch(launch).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AccountId, ExecutionId, LicensingMode, ProtectionGroupId, RightSizingMethod,
        LaunchDisposition,
    };
    use crate::store::memory::InMemoryStateStore;
    use async_trait::async_trait;

    fn poller(drs: Arc<dyn DrsClient>, store: Arc<dyn StateStore>) -> Arc<JobPoller> {
        use crate::credentials::{CredentialCache, CredentialProvider, CredentialPurpose, ScopedCredentials};
        use crate::clock::SystemClock;

        struct StubProvider;
        #[async_trait]
        impl CredentialProvider for StubProvider {
            async fn get_credentials(
                &self,
                _account_id: &AccountId,
                _region: &crate::domain::Region,
                _purpose: CredentialPurpose,
            ) -> Result<ScopedCredentials> {
                Ok(ScopedCredentials {
                    access_key_id: "AKIA".into(),
                    secret_access_key: "s".into(),
                    session_token: "t".into(),
                    expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                })
            }
        }

        Arc::new(JobPoller::new(
            drs,
            store,
            Arc::new(CredentialCache::new(
                Arc::new(StubProvider),
                &crate::config::CredentialCacheConfig::default(),
            )),
            Arc::new(SystemClock),
            crate::config::PollerConfig::default(),
        ))
    }

    struct FakeRepository;
    #[async_trait]
    impl Repository for FakeRepository {
        async fn get_protection_group(
            &self,
            _id: ProtectionGroupId,
        ) -> Result<Option<ProtectionGroup>> {
            Ok(None)
        }
        async fn resolve_servers_by_tag(
            &self,
            _account_id: &AccountId,
            _region: &crate::domain::Region,
            _tag_selector: &TagSelector,
        ) -> Result<Vec<SourceServerId>> {
            Ok(vec!["s-1".into(), "s-2".into()])
        }
        async fn get_recovery_plan(
            &self,
            _id: crate::domain::RecoveryPlanId,
        ) -> Result<Option<crate::domain::RecoveryPlan>> {
            Ok(None)
        }
        async fn get_target_account(
            &self,
            _id: &AccountId,
        ) -> Result<Option<crate::repository::TargetAccount>> {
            Ok(None)
        }
    }

    struct FakeDrs;
    #[async_trait]
    impl DrsClient for FakeDrs {
        async fn describe_source_servers(
            &self,
            _scope: &CallScope,
            _filter: SourceServerFilter,
        ) -> Result<Vec<crate::drs::SourceServerSummary>> {
            Ok(vec![])
        }
        async fn start_recovery(
            &self,
            _scope: &CallScope,
            source_servers: &[SourceServerId],
            _is_drill: bool,
            _tags: HashMap<String, String>,
        ) -> Result<crate::drs::Job> {
            Ok(crate::drs::Job {
                job_id: format!("job-{}", source_servers[0]),
                status: crate::drs::JobStatus::Started,
                participating_servers: vec![],
            })
        }
        async fn describe_jobs(
            &self,
            _scope: &CallScope,
            _job_ids: &[String],
        ) -> Result<Vec<crate::drs::Job>> {
            Ok(vec![])
        }
        async fn describe_recovery_instances(
            &self,
            _scope: &CallScope,
            _source_server_ids: &[SourceServerId],
        ) -> Result<Vec<crate::drs::RecoveryInstance>> {
            Ok(vec![])
        }
        async fn terminate_recovery_instances(
            &self,
            _scope: &CallScope,
            _recovery_instance_ids: &[String],
        ) -> Result<crate::drs::TerminateJob> {
            Ok(crate::drs::TerminateJob {
                terminate_job_id: "term-1".into(),
            })
        }
        async fn describe_job_log_items(
            &self,
            _scope: &CallScope,
            _job_id: &str,
        ) -> Result<Vec<crate::drs::JobLogItem>> {
            Ok(vec![])
        }
    }

    fn group() -> ProtectionGroup {
        ProtectionGroup {
            id: ProtectionGroupId(uuid::Uuid::new_v4()),
            name: "g".into(),
            target_account_id: "123456789012".into(),
            region: "us-east-1".into(),
            server_selection: ServerSelection::Explicit(vec!["s-1".into(), "s-2".into()]),
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

    #[tokio::test]
    async fn run_transitions_a_wave_to_polling_on_successful_launch() {
        let store = Arc::new(InMemoryStateStore::new());
        let drs: Arc<dyn DrsClient> = Arc::new(FakeDrs);
        let runner = WaveRunner::new(
            Arc::new(FakeRepository),
            drs.clone(),
            store.clone(),
            poller(drs, store.clone()),
            ConcurrencyConfig::default(),
        );

        let execution_id = ExecutionId::new();
        let wave = WaveExecution::new_pending(execution_id, 1);
        let result = runner
            .run(wave, &group(), execution_id.to_string(), true)
            .await
            .unwrap();

        assert_eq!(result.status, WaveStatus::Polling);
        assert_eq!(result.server_count, 2);

        let launches = store.get_server_launches(execution_id, 1).await.unwrap();
        assert_eq!(launches.len(), 2);
        assert!(launches
            .iter()
            .all(|l| l.status == ServerLaunchStatus::Launching));
        assert_eq!(runner.poller.tracked_count(), 2);
    }

    #[tokio::test]
    async fn run_rejects_a_wave_over_the_size_limit() {
        let store = Arc::new(InMemoryStateStore::new());
        let drs: Arc<dyn DrsClient> = Arc::new(FakeDrs);
        let runner = WaveRunner::new(
            Arc::new(FakeRepository),
            drs.clone(),
            store.clone(),
            poller(drs, store),
            ConcurrencyConfig::default(),
        );

        let mut big_group = group();
        big_group.server_selection =
            ServerSelection::Explicit((0..101).map(|i| format!("s-{i}")).collect());

        let execution_id = ExecutionId::new();
        let wave = WaveExecution::new_pending(execution_id, 1);
        let err = runner
            .run(wave, &big_group, execution_id.to_string(), false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WAVE_SIZE_LIMIT_EXCEEDED");
    }
}
