//! AWS-backed `DrsClient` (spec §6.3). Wraps `aws-sdk-drs` calls, scoping
//! each one to the target account/region via the Credential Broker and
//! guarding the endpoint with a per-(account,region) circuit breaker
//! (spec §4.3, §4.4, §7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use aws_credential_types::Credentials as AwsCredentials;
use tracing::{instrument, warn};

use crate::credentials::{CredentialCache, CredentialPurpose};
use crate::domain::SourceServerId;
use crate::drs::{
    CallScope, DrsClient, Job, JobLogItem, JobStatus, LaunchStatus, ParticipatingServer,
    RecoveryInstance, SourceServerFilter, SourceServerSummary, TerminateJob,
};
use crate::error::{EngineError, Result};
use crate::orchestration::CircuitBreakerRegistry;

/// Builds a scoped `aws_sdk_drs::Client` per call, using the Credential
/// Broker for short-lived credentials and a circuit breaker registry to
/// stop hammering a degraded (account, region) pair.
pub struct AwsDrsClient {
    credentials: Arc<CredentialCache>,
    breakers: CircuitBreakerRegistry,
}

impl AwsDrsClient {
    pub fn new(credentials: Arc<CredentialCache>) -> Self {
        Self {
            credentials,
            breakers: CircuitBreakerRegistry::new(Default::default()),
        }
    }

    async fn client_for(&self, scope: &CallScope) -> Result<aws_sdk_drs::Client> {
        let scoped = self
            .credentials
            .get(&scope.account_id, &scope.region, CredentialPurpose::DrsControlPlane)
            .await?;

        let credentials = AwsCredentials::new(
            scoped.access_key_id,
            scoped.secret_access_key,
            Some(scoped.session_token),
            Some(scoped.expires_at.into()),
            "drs-orchestrator-credential-broker",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_drs::config::Region::new(scope.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        Ok(aws_sdk_drs::Client::new(&sdk_config))
    }

    fn breaker_key(scope: &CallScope) -> String {
        format!("{}:{}", scope.account_id, scope.region)
    }

    fn map_launch_status(status: Option<&str>) -> LaunchStatus {
        match status {
            Some("LAUNCHED") => LaunchStatus::Launched,
            Some("IN_PROGRESS") => LaunchStatus::InProgress,
            Some("FAILED") => LaunchStatus::Failed,
            _ => LaunchStatus::Pending,
        }
    }

    fn map_job_status(status: Option<&str>) -> JobStatus {
        match status {
            Some("STARTED") => JobStatus::Started,
            Some("COMPLETED") => JobStatus::Completed,
            Some("FAILED") => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

#[async_trait]
impl DrsClient for AwsDrsClient {
    #[instrument(skip(self))]
    async fn describe_source_servers(
        &self,
        scope: &CallScope,
        filter: SourceServerFilter,
    ) -> Result<Vec<SourceServerSummary>> {
        let client = self.client_for(scope).await?;
        let breaker = self.breakers.get_or_create(&Self::breaker_key(scope));
        let started = Instant::now();

        let mut request = client.describe_source_servers();
        if let SourceServerFilter::Ids(ids) = &filter {
            request = request.set_filters(Some(
                aws_sdk_drs::types::DescribeSourceServersRequestFilters::builder()
                    .set_source_server_i_ds(Some(ids.clone()))
                    .build(),
            ));
        }

        let response = breaker
            .call(async {
                request
                    .send()
                    .await
                    .map_err(|e| EngineError::ServiceUnavailable(format!("DescribeSourceServers: {e}")))
            })
            .await?;
        warn_if_slow(started, "DescribeSourceServers");

        let servers = response
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| {
                let id = s.source_server_id?;
                let tags = s
                    .tags
                    .unwrap_or_default()
                    .into_iter()
                    .collect::<HashMap<_, _>>();
                Some(SourceServerSummary {
                    source_server_id: id,
                    hostname: s
                        .source_properties
                        .and_then(|p| p.identification_hints)
                        .and_then(|h| h.hostname),
                    tags,
                })
            })
            .collect();

        Ok(servers)
    }

    #[instrument(skip(self, tags))]
    async fn start_recovery(
        &self,
        scope: &CallScope,
        source_servers: &[SourceServerId],
        is_drill: bool,
        tags: HashMap<String, String>,
    ) -> Result<Job> {
        let client = self.client_for(scope).await?;
        let breaker = self.breakers.get_or_create(&Self::breaker_key(scope));

        let entries: Vec<aws_sdk_drs::types::StartRecoveryRequestSourceServer> = source_servers
            .iter()
            .map(|id| {
                aws_sdk_drs::types::StartRecoveryRequestSourceServer::builder()
                    .source_server_id(id.clone())
                    .build()
                    .expect("source_server_id is required")
            })
            .collect();

        let response = breaker
            .call(async {
                client
                    .start_recovery()
                    .set_source_servers(Some(entries))
                    .is_drill(is_drill)
                    .set_tags(Some(tags))
                    .send()
                    .await
                    .map_err(|e| EngineError::LaunchFailed(format!("StartRecovery: {e}")))
            })
            .await?;

        let job = response
            .job
            .ok_or_else(|| EngineError::LaunchFailed("StartRecovery returned no job".into()))?;

        Ok(Job {
            job_id: job.job_id.unwrap_or_default(),
            status: Self::map_job_status(job.status.as_ref().map(|s| s.as_str())),
            participating_servers: job
                .participating_servers
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| {
                    let source_server_id = p.source_server_id?;
                    Some(ParticipatingServer {
                        source_server_id,
                        launch_status: Self::map_launch_status(
                            p.launch_status.as_ref().map(|s| s.as_str()),
                        ),
                        recovery_instance_id: p.recovery_instance_id,
                        error_code: None,
                        error_message: None,
                    })
                })
                .collect(),
        })
    }

    #[instrument(skip(self))]
    async fn describe_jobs(&self, scope: &CallScope, job_ids: &[String]) -> Result<Vec<Job>> {
        let client = self.client_for(scope).await?;
        let breaker = self.breakers.get_or_create(&Self::breaker_key(scope));
        let job_ids = job_ids.to_vec();

        let response = breaker
            .call(async {
                client
                    .describe_jobs()
                    .set_filters(Some(
                        aws_sdk_drs::types::DescribeJobsRequestFilters::builder()
                            .set_job_i_ds(Some(job_ids))
                            .build(),
                    ))
                    .send()
                    .await
                    .map_err(|e| EngineError::ServiceUnavailable(format!("DescribeJobs: {e}")))
            })
            .await?;

        let jobs = response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|job| Job {
                job_id: job.job_id.unwrap_or_default(),
                status: Self::map_job_status(job.status.as_ref().map(|s| s.as_str())),
                participating_servers: job
                    .participating_servers
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|p| {
                        let source_server_id = p.source_server_id?;
                        Some(ParticipatingServer {
                            source_server_id,
                            launch_status: Self::map_launch_status(
                                p.launch_status.as_ref().map(|s| s.as_str()),
                            ),
                            recovery_instance_id: p.recovery_instance_id,
                            error_code: None,
                            error_message: None,
                        })
                    })
                    .collect(),
            })
            .collect();

        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn describe_recovery_instances(
        &self,
        scope: &CallScope,
        source_server_ids: &[SourceServerId],
    ) -> Result<Vec<RecoveryInstance>> {
        let client = self.client_for(scope).await?;
        let breaker = self.breakers.get_or_create(&Self::breaker_key(scope));
        let ids = source_server_ids.to_vec();

        let response = breaker
            .call(async {
                client
                    .describe_recovery_instances()
                    .set_filters(Some(
                        aws_sdk_drs::types::DescribeRecoveryInstancesRequestFilters::builder()
                            .set_source_server_i_ds(Some(ids))
                            .build(),
                    ))
                    .send()
                    .await
                    .map_err(|e| {
                        EngineError::ServiceUnavailable(format!("DescribeRecoveryInstances: {e}"))
                    })
            })
            .await?;

        let instances = response
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| {
                Some(RecoveryInstance {
                    recovery_instance_id: i.recovery_instance_id?,
                    source_server_id: i.source_server_id?,
                })
            })
            .collect();

        Ok(instances)
    }

    #[instrument(skip(self))]
    async fn terminate_recovery_instances(
        &self,
        scope: &CallScope,
        recovery_instance_ids: &[String],
    ) -> Result<TerminateJob> {
        let client = self.client_for(scope).await?;
        let breaker = self.breakers.get_or_create(&Self::breaker_key(scope));
        let ids = recovery_instance_ids.to_vec();

        let response = breaker
            .call(async {
                client
                    .terminate_recovery_instances()
                    .set_recovery_instance_i_ds(Some(ids))
                    .send()
                    .await
                    .map_err(|e| {
                        EngineError::Internal(format!("TerminateRecoveryInstances: {e}"))
                    })
            })
            .await?;

        Ok(TerminateJob {
            terminate_job_id: response
                .job
                .and_then(|j| j.job_id)
                .unwrap_or_default(),
        })
    }

    #[instrument(skip(self))]
    async fn describe_job_log_items(
        &self,
        scope: &CallScope,
        job_id: &str,
    ) -> Result<Vec<JobLogItem>> {
        let client = self.client_for(scope).await?;
        let breaker = self.breakers.get_or_create(&Self::breaker_key(scope));
        let job_id = job_id.to_string();

        let response = breaker
            .call(async {
                client
                    .describe_job_log_items()
                    .job_id(job_id)
                    .send()
                    .await
                    .map_err(|e| {
                        EngineError::ServiceUnavailable(format!("DescribeJobLogItems: {e}"))
                    })
            })
            .await?;

        let items = response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|item| JobLogItem {
                logged_at: item
                    .log_date_time
                    .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .unwrap_or_else(chrono::Utc::now),
                event: item.event.map(|e| e.as_str().to_string()).unwrap_or_default(),
                message: None,
            })
            .collect();

        Ok(items)
    }
}

fn warn_if_slow(started: Instant, operation: &str) {
    let elapsed = started.elapsed();
    if elapsed.as_secs() > 5 {
        warn!(operation, ?elapsed, "slow DRS call");
    }
}
