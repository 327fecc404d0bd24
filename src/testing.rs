//! Test fakes shared across unit and integration tests. Gated behind
//! `cfg(test)`/the `testing` feature so they never ship in a production
//! build.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::credentials::{CredentialProvider, CredentialPurpose, ScopedCredentials};
use crate::domain::{
    AccountId, ProtectionGroup, ProtectionGroupId, RecoveryPlan, RecoveryPlanId, Region,
    SourceServerId,
};
use crate::drs::{
    CallScope, DrsClient, Job, JobLogItem, JobStatus, RecoveryInstance, SourceServerFilter,
    SourceServerSummary, TerminateJob,
};
use crate::error::Result;
use crate::repository::{Repository, TagSelector, TargetAccount};

/// A clock whose `now()` is an offset applied to the real wall clock,
/// advanced explicitly by tests instead of via real sleeps.
pub struct FakeClock {
    offset_secs: AtomicI64,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            offset_secs: AtomicI64::new(0),
        })
    }

    pub fn advance(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(self.offset_secs.load(Ordering::SeqCst))
    }

    async fn sleep(&self, _duration: std::time::Duration) {
        // Tests drive time via `advance`; a real sleep would make them slow
        // and nondeterministic.
    }
}

/// An in-memory catalog of groups/plans/accounts, seeded by the test.
#[derive(Default)]
pub struct FakeRepository {
    pub groups: Mutex<HashMap<ProtectionGroupId, ProtectionGroup>>,
    pub plans: Mutex<HashMap<RecoveryPlanId, RecoveryPlan>>,
    pub accounts: Mutex<HashMap<AccountId, TargetAccount>>,
    pub tag_resolution: Mutex<HashMap<String, Vec<SourceServerId>>>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(self, group: ProtectionGroup) -> Self {
        self.groups.lock().insert(group.id, group);
        self
    }

    pub fn with_plan(self, plan: RecoveryPlan) -> Self {
        self.plans.lock().insert(plan.id, plan);
        self
    }
}

#[async_trait]
impl Repository for FakeRepository {
    async fn get_protection_group(&self, id: ProtectionGroupId) -> Result<Option<ProtectionGroup>> {
        Ok(self.groups.lock().get(&id).cloned())
    }

    async fn resolve_servers_by_tag(
        &self,
        _account_id: &AccountId,
        _region: &Region,
        tag_selector: &TagSelector,
    ) -> Result<Vec<SourceServerId>> {
        let key = format!("{}={}", tag_selector.key, tag_selector.value);
        Ok(self.tag_resolution.lock().get(&key).cloned().unwrap_or_default())
    }

    async fn get_recovery_plan(&self, id: RecoveryPlanId) -> Result<Option<RecoveryPlan>> {
        Ok(self.plans.lock().get(&id).cloned())
    }

    async fn get_target_account(&self, id: &AccountId) -> Result<Option<TargetAccount>> {
        Ok(self.accounts.lock().get(id).cloned())
    }
}

/// Always issues the same fixed short-lived credentials.
pub struct FakeCredentialProvider;

#[async_trait]
impl CredentialProvider for FakeCredentialProvider {
    async fn get_credentials(
        &self,
        _account_id: &AccountId,
        _region: &Region,
        _purpose: CredentialPurpose,
    ) -> Result<ScopedCredentials> {
        Ok(ScopedCredentials {
            access_key_id: "AKIAFAKE".into(),
            secret_access_key: "fake-secret".into(),
            session_token: "fake-session-token".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

/// A `DrsClient` whose jobs stay non-terminal until the test calls
/// [`ScriptedDrsClient::complete_all`], for exercising cancel-mid-poll and
/// partial-wave scenarios that `FakeDrsClient`'s instant completion can't
/// reach.
#[derive(Default)]
pub struct ScriptedDrsClient {
    fail_servers: Mutex<std::collections::HashSet<SourceServerId>>,
    jobs: Mutex<HashMap<String, Job>>,
}

impl ScriptedDrsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark these source servers to complete FAILED instead of LAUNCHED the
    /// next time [`Self::complete_all`] runs.
    pub fn with_failing(self, ids: impl IntoIterator<Item = SourceServerId>) -> Self {
        self.fail_servers.lock().extend(ids);
        self
    }

    /// How many jobs are currently tracked (started but not yet completed
    /// or completed already), for tests asserting launches reached POLLING.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Flip every outstanding job from STARTED to COMPLETED, applying the
    /// LAUNCHED/FAILED outcome configured via `with_failing`.
    pub fn complete_all(&self) {
        let fail_servers = self.fail_servers.lock();
        let mut jobs = self.jobs.lock();
        for job in jobs.values_mut() {
            job.status = JobStatus::Completed;
            for participant in &mut job.participating_servers {
                let failed = fail_servers.contains(&participant.source_server_id);
                participant.launch_status = if failed {
                    crate::drs::LaunchStatus::Failed
                } else {
                    crate::drs::LaunchStatus::Launched
                };
                participant.error_code = failed.then(|| "LAUNCH_FAILED".to_string());
                participant.error_message = failed.then(|| "scripted failure".to_string());
            }
        }
    }
}

#[async_trait]
impl DrsClient for ScriptedDrsClient {
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
        source_servers: &[SourceServerId],
        _is_drill: bool,
        _tags: HashMap<String, String>,
    ) -> Result<Job> {
        let job_id = format!("job-{}", source_servers.join("-"));
        let job = Job {
            job_id: job_id.clone(),
            status: JobStatus::Started,
            participating_servers: source_servers
                .iter()
                .map(|id| crate::drs::ParticipatingServer {
                    source_server_id: id.clone(),
                    launch_status: crate::drs::LaunchStatus::Pending,
                    recovery_instance_id: None,
                    error_code: None,
                    error_message: None,
                })
                .collect(),
        };
        self.jobs.lock().insert(job_id, job.clone());
        Ok(job)
    }

    async fn describe_jobs(&self, _scope: &CallScope, job_ids: &[String]) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock();
        Ok(job_ids.iter().filter_map(|id| jobs.get(id).cloned()).collect())
    }

    async fn describe_recovery_instances(
        &self,
        _scope: &CallScope,
        source_server_ids: &[SourceServerId],
    ) -> Result<Vec<RecoveryInstance>> {
        Ok(source_server_ids
            .iter()
            .map(|id| RecoveryInstance {
                recovery_instance_id: format!("i-{id}"),
                source_server_id: id.clone(),
            })
            .collect())
    }

    async fn terminate_recovery_instances(
        &self,
        _scope: &CallScope,
        recovery_instance_ids: &[String],
    ) -> Result<TerminateJob> {
        Ok(TerminateJob {
            terminate_job_id: format!("term-{}", recovery_instance_ids.join("-")),
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

/// A scripted `DrsClient`: every Start-Recovery call succeeds immediately
/// and every job it hands out is reported COMPLETED/LAUNCHED the moment
/// `describe_jobs` is called, so wave fan-out tests don't need a real
/// poller loop.
#[derive(Default)]
pub struct FakeDrsClient {
    pub source_servers: Mutex<HashMap<String, Vec<SourceServerSummary>>>,
    pub jobs: Mutex<HashMap<String, Job>>,
    pub recovery_instances: Mutex<HashMap<SourceServerId, String>>,
    pub job_log_items: Mutex<HashMap<String, Vec<JobLogItem>>>,
}

impl FakeDrsClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DrsClient for FakeDrsClient {
    async fn describe_source_servers(
        &self,
        scope: &CallScope,
        _filter: SourceServerFilter,
    ) -> Result<Vec<SourceServerSummary>> {
        let key = format!("{}:{}", scope.account_id, scope.region);
        Ok(self.source_servers.lock().get(&key).cloned().unwrap_or_default())
    }

    async fn start_recovery(
        &self,
        _scope: &CallScope,
        source_servers: &[SourceServerId],
        _is_drill: bool,
        _tags: HashMap<String, String>,
    ) -> Result<Job> {
        let job_id = format!("job-{}", source_servers.join("-"));
        let job = Job {
            job_id: job_id.clone(),
            status: JobStatus::Completed,
            participating_servers: source_servers
                .iter()
                .map(|id| crate::drs::ParticipatingServer {
                    source_server_id: id.clone(),
                    launch_status: crate::drs::LaunchStatus::Launched,
                    recovery_instance_id: None,
                    error_code: None,
                    error_message: None,
                })
                .collect(),
        };
        self.jobs.lock().insert(job_id, job.clone());
        Ok(job)
    }

    async fn describe_jobs(&self, _scope: &CallScope, job_ids: &[String]) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock();
        Ok(job_ids.iter().filter_map(|id| jobs.get(id).cloned()).collect())
    }

    async fn describe_recovery_instances(
        &self,
        _scope: &CallScope,
        source_server_ids: &[SourceServerId],
    ) -> Result<Vec<RecoveryInstance>> {
        let instances = self.recovery_instances.lock();
        Ok(source_server_ids
            .iter()
            .filter_map(|id| {
                instances.get(id).map(|recovery_instance_id| RecoveryInstance {
                    recovery_instance_id: recovery_instance_id.clone(),
                    source_server_id: id.clone(),
                })
            })
            .collect())
    }

    async fn terminate_recovery_instances(
        &self,
        _scope: &CallScope,
        recovery_instance_ids: &[String],
    ) -> Result<TerminateJob> {
        Ok(TerminateJob {
            terminate_job_id: format!("term-{}", recovery_instance_ids.join("-")),
        })
    }

    async fn describe_job_log_items(
        &self,
        _scope: &CallScope,
        job_id: &str,
    ) -> Result<Vec<JobLogItem>> {
        Ok(self.job_log_items.lock().get(job_id).cloned().unwrap_or_default())
    }
}
