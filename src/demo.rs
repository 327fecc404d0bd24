//! Reference in-process harness used by the bundled binaries
//! (`drs-orchestrator-server`, `drs-orchestrator-cli`). The real Repository,
//! CredentialProvider, and DrsClient are external collaborators an embedder
//! supplies (spec §1, §6.2, §6.3, §4.6); this module stands in for them with
//! an in-memory catalog and an always-succeeds DRS double so the binaries
//! have something runnable without AWS credentials on hand.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::credentials::{CredentialProvider, CredentialPurpose, ScopedCredentials};
use crate::domain::{
    AccountId, LaunchConfig, LaunchDisposition, LicensingMode, ProtectionGroup, ProtectionGroupId,
    RecoveryPlan, RecoveryPlanId, Region, RightSizingMethod, ServerSelection, SourceServerId,
    WaveSpec,
};
use crate::drs::{
    CallScope, DrsClient, Job, JobLogItem, JobStatus, LaunchStatus, ParticipatingServer,
    RecoveryInstance, SourceServerFilter, SourceServerSummary, TerminateJob,
};
use crate::error::Result;
use crate::repository::{Repository, TagSelector, TargetAccount};

/// Which of the sample Recovery Plans to build, covering the scenario
/// shapes named in spec §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// One wave, two servers, no dependencies.
    SingleWave,
    /// Two waves; wave 2 depends on wave 1.
    DependentWaves,
    /// Two waves; wave 2 is marked `pause_before_wave`.
    PauseBeforeSecondWave,
    /// Two waves, independent; the Wave Runner is told to fail every server
    /// in wave 1 so wave 2 is observed skipped.
    FailingFirstWave,
}

/// An in-memory catalog seeded with exactly one Protection Group per wave
/// and one Recovery Plan, built for `Scenario`.
pub fn build_scenario(scenario: Scenario) -> (DemoRepository, RecoveryPlanId) {
    let plan_id = RecoveryPlanId(uuid::Uuid::new_v4());
    let repo = DemoRepository::new();

    let group_for = |n: u32, fail: bool| {
        let group = ProtectionGroup {
            id: ProtectionGroupId(uuid::Uuid::new_v4()),
            name: format!("wave-{n}-group"),
            target_account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            server_selection: ServerSelection::Explicit(vec![
                format!("s-{n}-001"),
                format!("s-{n}-002"),
            ]),
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
        };
        if fail {
            repo.fail_servers
                .lock()
                .extend(group.server_selection_ids().into_iter());
        }
        repo.groups.lock().insert(group.id, group.clone());
        group
    };

    let waves = match scenario {
        Scenario::SingleWave => {
            let g = group_for(1, false);
            vec![WaveSpec {
                wave_number: 1,
                group_id: g.id,
                pause_before_wave: false,
                depends_on: vec![],
            }]
        }
        Scenario::DependentWaves => {
            let g1 = group_for(1, false);
            let g2 = group_for(2, false);
            vec![
                WaveSpec {
                    wave_number: 1,
                    group_id: g1.id,
                    pause_before_wave: false,
                    depends_on: vec![],
                },
                WaveSpec {
                    wave_number: 2,
                    group_id: g2.id,
                    pause_before_wave: false,
                    depends_on: vec![1],
                },
            ]
        }
        Scenario::PauseBeforeSecondWave => {
            let g1 = group_for(1, false);
            let g2 = group_for(2, false);
            vec![
                WaveSpec {
                    wave_number: 1,
                    group_id: g1.id,
                    pause_before_wave: false,
                    depends_on: vec![],
                },
                WaveSpec {
                    wave_number: 2,
                    group_id: g2.id,
                    pause_before_wave: true,
                    depends_on: vec![],
                },
            ]
        }
        Scenario::FailingFirstWave => {
            let g1 = group_for(1, true);
            let g2 = group_for(2, false);
            vec![
                WaveSpec {
                    wave_number: 1,
                    group_id: g1.id,
                    pause_before_wave: false,
                    depends_on: vec![],
                },
                WaveSpec {
                    wave_number: 2,
                    group_id: g2.id,
                    pause_before_wave: false,
                    depends_on: vec![1],
                },
            ]
        }
    };

    let plan = RecoveryPlan {
        id: plan_id,
        name: format!("{scenario:?}"),
        waves,
    };
    repo.plans.lock().insert(plan_id, plan);
    (repo, plan_id)
}

impl ProtectionGroup {
    fn server_selection_ids(&self) -> Vec<SourceServerId> {
        match &self.server_selection {
            ServerSelection::Explicit(ids) => ids.clone(),
            ServerSelection::TagExpression(_) => vec![],
        }
    }
}

/// In-memory `Repository` seeded by [`build_scenario`].
#[derive(Default)]
pub struct DemoRepository {
    pub groups: Mutex<HashMap<ProtectionGroupId, ProtectionGroup>>,
    pub plans: Mutex<HashMap<RecoveryPlanId, RecoveryPlan>>,
    /// Source server ids `DemoDrsClient::start_recovery` should fail, for
    /// exercising the downstream-skip path.
    pub fail_servers: Mutex<std::collections::HashSet<SourceServerId>>,
}

impl DemoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for DemoRepository {
    async fn get_protection_group(&self, id: ProtectionGroupId) -> Result<Option<ProtectionGroup>> {
        Ok(self.groups.lock().get(&id).cloned())
    }

    async fn resolve_servers_by_tag(
        &self,
        _account_id: &AccountId,
        _region: &Region,
        _tag_selector: &TagSelector,
    ) -> Result<Vec<SourceServerId>> {
        Ok(vec![])
    }

    async fn get_recovery_plan(&self, id: RecoveryPlanId) -> Result<Option<RecoveryPlan>> {
        Ok(self.plans.lock().get(&id).cloned())
    }

    async fn get_target_account(&self, id: &AccountId) -> Result<Option<TargetAccount>> {
        Ok(Some(TargetAccount {
            account_id: id.clone(),
            role_arn: format!("arn:aws:iam::{id}:role/drs-orchestrator-demo"),
            external_id: "demo-external-id".to_string(),
            region: "us-east-1".to_string(),
        }))
    }
}

/// Issues fixed demo credentials; never talks to STS.
pub struct DemoCredentialProvider;

#[async_trait]
impl CredentialProvider for DemoCredentialProvider {
    async fn get_credentials(
        &self,
        _account_id: &AccountId,
        _region: &Region,
        _purpose: CredentialPurpose,
    ) -> Result<ScopedCredentials> {
        Ok(ScopedCredentials {
            access_key_id: "AKIADEMO".to_string(),
            secret_access_key: "demo-secret".to_string(),
            session_token: "demo-session-token".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

/// Completes every Start-Recovery job instantly, failing servers named in
/// `DemoRepository::fail_servers` so `Scenario::FailingFirstWave` can
/// demonstrate downstream wave skipping.
#[derive(Default)]
pub struct DemoDrsClient {
    pub fail_servers: std::collections::HashSet<SourceServerId>,
    jobs: Mutex<HashMap<String, Job>>,
}

impl DemoDrsClient {
    pub fn new(fail_servers: std::collections::HashSet<SourceServerId>) -> Self {
        Self {
            fail_servers,
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DrsClient for DemoDrsClient {
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
        let participating_servers = source_servers
            .iter()
            .map(|id| {
                let failed = self.fail_servers.contains(id);
                ParticipatingServer {
                    source_server_id: id.clone(),
                    launch_status: if failed {
                        LaunchStatus::Failed
                    } else {
                        LaunchStatus::Launched
                    },
                    recovery_instance_id: None,
                    error_code: failed.then(|| "LAUNCH_FAILED".to_string()),
                    error_message: failed.then(|| "demo-forced failure".to_string()),
                }
            })
            .collect();
        let job = Job {
            job_id: job_id.clone(),
            status: JobStatus::Completed,
            participating_servers,
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
                recovery_instance_id: format!("i-demo-{id}"),
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
