//! # Job Poller
//!
//! Drives every in-flight DRS job to a terminal outcome (spec §4.4): per-job
//! geometric backoff with jitter, Describe-Jobs calls coalesced by
//! (account, region), a maximum job lifetime beyond which a job fails with
//! `POLL_TIMEOUT`, and a consecutive-auth-failure counter that forces a
//! credential refresh before giving up.
//!
//! One `JobPoller` instance services every tracked job across every
//! execution — it is a shared pool, not one poller per wave (spec §5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::PollerConfig;
use crate::credentials::{CredentialCache, CredentialPurpose};
use crate::domain::{AccountId, ExecutionId, Region, ServerLaunch, ServerLaunchStatus};
use crate::drs::{CallScope, DrsClient, JobStatus, LaunchStatus};
use crate::error::Result;
use crate::orchestration::{RetryConfig, RetryExecutor};
use crate::store::StateStore;

/// One DRS job being tracked to completion.
#[derive(Debug, Clone)]
struct TrackedJob {
    execution_id: ExecutionId,
    wave_number: u32,
    source_server_id: String,
    job_id: String,
    account_id: AccountId,
    region: Region,
    launched_at: DateTime<Utc>,
    next_poll_at: DateTime<Utc>,
    attempt: usize,
    consecutive_auth_failures: u32,
}

/// Shared pool that polls every tracked DRS job to a terminal ServerLaunch
/// status (spec §4.4).
pub struct JobPoller {
    drs: Arc<dyn DrsClient>,
    store: Arc<dyn StateStore>,
    credentials: Arc<CredentialCache>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    retry: RetryExecutor,
    jobs: Mutex<Vec<TrackedJob>>,
}

impl JobPoller {
    pub fn new(
        drs: Arc<dyn DrsClient>,
        store: Arc<dyn StateStore>,
        credentials: Arc<CredentialCache>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        let retry = RetryExecutor::new(RetryConfig {
            max_attempts: 1,
            initial_delay: config.backoff_base,
            max_delay: config.backoff_cap,
            multiplier: config.backoff_factor,
            jitter: config.jitter_fraction,
        });
        Self {
            drs,
            store,
            credentials,
            clock,
            config,
            retry,
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Register a freshly-launched job for polling (spec §4.3 step 4:
    /// "Register jobs with the Job Poller"). Idempotent on `job_id` so a
    /// Supervisor re-registering an already-in-flight job after a restart
    /// (spec §5, §8 scenario S6) doesn't double-track it.
    pub fn track(
        &self,
        execution_id: ExecutionId,
        wave_number: u32,
        source_server_id: String,
        job_id: String,
        account_id: AccountId,
        region: Region,
    ) {
        let mut jobs = self.jobs.lock();
        if jobs.iter().any(|j| j.job_id == job_id) {
            return;
        }
        let now = self.clock.now();
        jobs.push(TrackedJob {
            execution_id,
            wave_number,
            source_server_id,
            job_id,
            account_id,
            region,
            launched_at: now,
            next_poll_at: now + chrono::Duration::from_std(self.config.initial_delay).unwrap(),
            attempt: 0,
            consecutive_auth_failures: 0,
        });
    }

    pub fn tracked_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// How long the oldest still-tracked job has been in flight, for the
    /// Supervisor's health snapshot (SPEC_FULL.md §B). `None` if nothing is
    /// currently tracked.
    pub fn oldest_tracked_job_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.jobs
            .lock()
            .iter()
            .map(|j| now - j.launched_at)
            .max()
    }

    /// The configured poll timeout (spec §4.4), for the Supervisor's health
    /// snapshot to judge whether the oldest in-flight job is overdue.
    pub fn max_job_lifetime(&self) -> std::time::Duration {
        self.config.max_job_lifetime
    }

    /// Run one poll tick: Describe-Jobs (coalesced per account/region) for
    /// every job whose backoff delay has elapsed, then apply spec §4.4's
    /// status mapping to each affected ServerLaunch.
    pub async fn poll_once(&self) -> Result<()> {
        let now = self.clock.now();
        let due: Vec<TrackedJob> = {
            let jobs = self.jobs.lock();
            jobs.iter().filter(|j| j.next_poll_at <= now).cloned().collect()
        };
        if due.is_empty() {
            return Ok(());
        }

        let mut by_scope: HashMap<(AccountId, Region), Vec<TrackedJob>> = HashMap::new();
        for job in due {
            by_scope
                .entry((job.account_id.clone(), job.region.clone()))
                .or_default()
                .push(job);
        }

        for ((account_id, region), jobs) in by_scope {
            let scope = CallScope { account_id, region };
            let job_ids: Vec<String> = jobs.iter().map(|j| j.job_id.clone()).collect();

            let result = self.retry.execute(|| {
                let scope = scope.clone();
                let job_ids = job_ids.clone();
                async move { self.drs.describe_jobs(&scope, &job_ids).await }
            }).await;

            match result {
                Ok(remote_jobs) => {
                    let by_id: HashMap<String, crate::drs::Job> =
                        remote_jobs.into_iter().map(|j| (j.job_id.clone(), j)).collect();
                    for job in jobs {
                        let remote = by_id.get(&job.job_id).cloned();
                        self.apply_update(&scope, job, remote.as_ref()).await?;
                    }
                }
                Err(e) => {
                    for job in jobs {
                        self.handle_poll_error(&scope, job, &e).await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn apply_update(
        &self,
        scope: &CallScope,
        mut job: TrackedJob,
        remote: Option<&crate::drs::Job>,
    ) -> Result<()> {
        let now = self.clock.now();

        if now - job.launched_at
            > chrono::Duration::from_std(self.config.max_job_lifetime).unwrap()
        {
            self.finish(job.execution_id, job.wave_number, &job.source_server_id, |l| {
                l.fail("POLL_TIMEOUT", "job exceeded maximum poll lifetime");
            })
            .await?;
            return Ok(());
        }

        let Some(remote) = remote else {
            self.reschedule(job);
            return Ok(());
        };

        match remote.status {
            JobStatus::Pending | JobStatus::Started => {
                job.attempt += 1;
                self.reschedule(job);
            }
            JobStatus::Completed => {
                let participating = remote
                    .participating_servers
                    .iter()
                    .find(|p| p.source_server_id == job.source_server_id);
                match participating.map(|p| p.launch_status) {
                    Some(LaunchStatus::Launched) => {
                        let recovery_instance_id = self.fetch_recovery_instance_id(scope, &job).await;
                        self.finish(job.execution_id, job.wave_number, &job.source_server_id, |l| {
                            l.status = ServerLaunchStatus::Launched;
                            l.recovery_instance_id = recovery_instance_id.clone();
                        })
                        .await?;
                    }
                    _ => {
                        let (code, message) = participating
                            .and_then(|p| p.error_code.clone().zip(p.error_message.clone()))
                            .unwrap_or_else(|| {
                                ("LAUNCH_FAILED".to_string(), "job completed without launching".to_string())
                            });
                        self.finish(job.execution_id, job.wave_number, &job.source_server_id, |l| {
                            l.fail(code.clone(), message.clone());
                        })
                        .await?;
                    }
                }
            }
            JobStatus::Failed => {
                self.finish(job.execution_id, job.wave_number, &job.source_server_id, |l| {
                    l.fail("LAUNCH_FAILED", "DRS job failed");
                })
                .await?;
            }
        }

        Ok(())
    }

    async fn fetch_recovery_instance_id(
        &self,
        scope: &CallScope,
        job: &TrackedJob,
    ) -> Option<String> {
        self.drs
            .describe_recovery_instances(scope, std::slice::from_ref(&job.source_server_id))
            .await
            .ok()
            .and_then(|instances| instances.into_iter().next())
            .map(|i| i.recovery_instance_id)
    }

    async fn handle_poll_error(
        &self,
        _scope: &CallScope,
        mut job: TrackedJob,
        error: &crate::error::EngineError,
    ) -> Result<()> {
        use crate::error::ErrorKind;

        if error.kind() == ErrorKind::Auth {
            job.consecutive_auth_failures += 1;
            self.credentials.invalidate(
                &job.account_id,
                &job.region,
                CredentialPurpose::DrsControlPlane,
            );
            if job.consecutive_auth_failures >= self.config.max_consecutive_auth_failures {
                self.finish(job.execution_id, job.wave_number, &job.source_server_id, |l| {
                    l.fail("AUTH_FAILED", "repeated auth failures while polling");
                })
                .await?;
                return Ok(());
            }
        } else {
            warn!(job_id = %job.job_id, error = %error, "transient error polling DRS job, retaining for next tick");
        }

        self.reschedule(job);
        Ok(())
    }

    fn reschedule(&self, mut job: TrackedJob) {
        let config = RetryConfig {
            max_attempts: usize::MAX,
            initial_delay: self.config.backoff_base,
            max_delay: self.config.backoff_cap,
            multiplier: self.config.backoff_factor,
            jitter: self.config.jitter_fraction,
        };
        let delay = config.delay_for_attempt(job.attempt);
        job.next_poll_at = self.clock.now() + chrono::Duration::from_std(delay).unwrap();
        self.jobs.lock().push(job);
    }

    async fn finish(
        &self,
        execution_id: ExecutionId,
        wave_number: u32,
        source_server_id: &str,
        apply: impl FnOnce(&mut ServerLaunch),
    ) -> Result<()> {
        let launches = self.store.get_server_launches(execution_id, wave_number).await?;
        if let Some(mut launch) = launches
            .into_iter()
            .find(|l| l.source_server_id == source_server_id)
        {
            apply(&mut launch);
            launch.last_polled_at = Some(self.clock.now());
            self.store.upsert_server_launch(launch).await?;
            info!(%execution_id, wave_number, source_server_id, "server launch reached a terminal state");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionId;
    use crate::drs::{Job, JobLogItem, ParticipatingServer, RecoveryInstance, SourceServerFilter, SourceServerSummary, TerminateJob};
    use crate::store::memory::InMemoryStateStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

    struct FakeClock {
        offset_secs: AtomicI64,
    }

    impl FakeClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                offset_secs: AtomicI64::new(0),
            })
        }

        fn advance(&self, secs: i64) {
            self.offset_secs.fetch_add(secs, AtomicOrdering::SeqCst);
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now() + chrono::Duration::seconds(self.offset_secs.load(AtomicOrdering::SeqCst))
        }

        async fn sleep(&self, _duration: std::time::Duration) {}
    }

    struct ScriptedDrs {
        job: Job,
    }

    #[async_trait]
    impl DrsClient for ScriptedDrs {
        async fn describe_source_servers(
            &self,
            _scope: &CallScope,
            _filter: SourceServerFilter,
        ) -> Result<Vec<SourceServerSummary>> {
            Ok(vec![])
        }
        async fn start_recovery(
            &self,
            _scope: &CallScope,
            _source_servers: &[String],
            _is_drill: bool,
            _tags: HashMap<String, String>,
        ) -> Result<Job> {
            Ok(self.job.clone())
        }
        async fn describe_jobs(&self, _scope: &CallScope, _job_ids: &[String]) -> Result<Vec<Job>> {
            Ok(vec![self.job.clone()])
        }
        async fn describe_recovery_instances(
            &self,
            _scope: &CallScope,
            source_server_ids: &[String],
        ) -> Result<Vec<RecoveryInstance>> {
            Ok(vec![RecoveryInstance {
                recovery_instance_id: "i-1".into(),
                source_server_id: source_server_ids[0].clone(),
            }])
        }
        async fn terminate_recovery_instances(
            &self,
            _scope: &CallScope,
            _recovery_instance_ids: &[String],
        ) -> Result<TerminateJob> {
            Ok(TerminateJob {
                terminate_job_id: "t-1".into(),
            })
        }
        async fn describe_job_log_items(
            &self,
            _scope: &CallScope,
            _job_id: &str,
        ) -> Result<Vec<JobLogItem>> {
            Ok(vec![])
        }
    }

    fn credential_cache() -> Arc<CredentialCache> {
        use crate::credentials::{CredentialProvider, ScopedCredentials};

        struct StubProvider;
        #[async_trait]
        impl CredentialProvider for StubProvider {
            async fn get_credentials(
                &self,
                _account_id: &AccountId,
                _region: &Region,
                _purpose: CredentialPurpose,
            ) -> Result<ScopedCredentials> {
                Ok(ScopedCredentials {
                    access_key_id: "AKIA".into(),
                    secret_access_key: "s".into(),
                    session_token: "t".into(),
                    expires_at: Utc::now() + chrono::Duration::hours(1),
                })
            }
        }
        Arc::new(CredentialCache::new(
            Arc::new(StubProvider),
            &crate::config::CredentialCacheConfig::default(),
        ))
    }

    #[tokio::test]
    async fn a_completed_launched_job_marks_the_server_launch_launched() {
        let store = Arc::new(InMemoryStateStore::new());
        let execution_id = ExecutionId::new();
        store
            .upsert_server_launch(ServerLaunch::new_pending(execution_id, 1, "s-1".into()))
            .await
            .unwrap();

        let drs = Arc::new(ScriptedDrs {
            job: Job {
                job_id: "job-1".into(),
                status: JobStatus::Completed,
                participating_servers: vec![ParticipatingServer {
                    source_server_id: "s-1".into(),
                    launch_status: LaunchStatus::Launched,
                    recovery_instance_id: Some("i-1".into()),
                    error_code: None,
                    error_message: None,
                }],
            },
        });

        let clock = FakeClock::new();
        let poller = JobPoller::new(
            drs,
            store.clone(),
            credential_cache(),
            clock.clone(),
            PollerConfig::default(),
        );
        poller.track(
            execution_id,
            1,
            "s-1".into(),
            "job-1".into(),
            "123456789012".into(),
            "us-east-1".into(),
        );

        clock.advance(11);
        poller.poll_once().await.unwrap();

        let launches = store.get_server_launches(execution_id, 1).await.unwrap();
        assert_eq!(launches[0].status, ServerLaunchStatus::Launched);
        assert_eq!(launches[0].recovery_instance_id.as_deref(), Some("i-1"));
    }

    #[tokio::test]
    async fn a_job_past_its_maximum_lifetime_fails_with_poll_timeout() {
        let store = Arc::new(InMemoryStateStore::new());
        let execution_id = ExecutionId::new();
        store
            .upsert_server_launch(ServerLaunch::new_pending(execution_id, 1, "s-1".into()))
            .await
            .unwrap();

        let drs = Arc::new(ScriptedDrs {
            job: Job {
                job_id: "job-1".into(),
                status: JobStatus::Started,
                participating_servers: vec![],
            },
        });

        let clock = FakeClock::new();
        let mut config = PollerConfig::default();
        config.max_job_lifetime = std::time::Duration::from_secs(60);
        let poller = JobPoller::new(drs, store.clone(), credential_cache(), clock.clone(), config);
        poller.track(
            execution_id,
            1,
            "s-1".into(),
            "job-1".into(),
            "123456789012".into(),
            "us-east-1".into(),
        );

        clock.advance(3600);
        poller.poll_once().await.unwrap();

        let launches = store.get_server_launches(execution_id, 1).await.unwrap();
        assert_eq!(launches[0].status, ServerLaunchStatus::Failed);
        assert_eq!(launches[0].error_code.as_deref(), Some("POLL_TIMEOUT"));
    }
}

