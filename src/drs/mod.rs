//! # DRS Service Interface
//!
//! The narrow slice of AWS Elastic Disaster Recovery that the core consumes
//! (spec §6.3). Every call is wrapped with the Credential Broker and a rate
//! limiter keyed by (accountId, region) at the call site, not inside this
//! trait.

pub mod aws;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SourceServerId;
use crate::error::Result;
use crate::repository::TagSelector;

/// One DRS source server as returned by `DescribeSourceServers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceServerSummary {
    pub source_server_id: SourceServerId,
    pub hostname: Option<String>,
    pub tags: std::collections::HashMap<String, String>,
}

/// Filter accepted by `DescribeSourceServers` (spec §6.3: "supports id list
/// and tag filters").
#[derive(Debug, Clone)]
pub enum SourceServerFilter {
    Ids(Vec<SourceServerId>),
    Tag(TagSelector),
}

/// Per-server outcome reported by `StartRecovery`/`DescribeJobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchStatus {
    Pending,
    InProgress,
    Launched,
    Failed,
}

/// One server's standing within a DRS job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipatingServer {
    pub source_server_id: SourceServerId,
    pub launch_status: LaunchStatus,
    pub recovery_instance_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// DRS job lifecycle status (spec §4.4's status mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Started,
    Completed,
    Failed,
}

/// One DRS job, returned by `StartRecovery` and refreshed by `DescribeJobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub participating_servers: Vec<ParticipatingServer>,
}

/// One DRS recovery instance, as returned by `DescribeRecoveryInstances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryInstance {
    pub recovery_instance_id: String,
    pub source_server_id: SourceServerId,
}

/// The job DRS creates in response to `TerminateRecoveryInstances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminateJob {
    pub terminate_job_id: String,
}

/// One log line from `DescribeJobLogItems`, surfaced to operators via
/// `GetJobLogs` (spec §6.1, §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogItem {
    pub logged_at: DateTime<Utc>,
    pub event: String,
    pub message: Option<String>,
}

/// Credentials to scope a single DRS call to one target account/region
/// (spec §4.6, §6.3). Opaque to everything except the concrete client impl.
#[derive(Debug, Clone)]
pub struct CallScope {
    pub account_id: crate::domain::AccountId,
    pub region: crate::domain::Region,
}

/// The narrow DRS surface the engine depends on (spec §6.3). Each
/// method corresponds to one AWS API the Wave Runner or Job Poller calls;
/// implementations are responsible for credential scoping, retries, and
/// rate limiting around the underlying SDK call.
#[async_trait]
pub trait DrsClient: Send + Sync {
    async fn describe_source_servers(
        &self,
        scope: &CallScope,
        filter: SourceServerFilter,
    ) -> Result<Vec<SourceServerSummary>>;

    async fn start_recovery(
        &self,
        scope: &CallScope,
        source_servers: &[SourceServerId],
        is_drill: bool,
        tags: std::collections::HashMap<String, String>,
    ) -> Result<Job>;

    async fn describe_jobs(&self, scope: &CallScope, job_ids: &[String]) -> Result<Vec<Job>>;

    async fn describe_recovery_instances(
        &self,
        scope: &CallScope,
        source_server_ids: &[SourceServerId],
    ) -> Result<Vec<RecoveryInstance>>;

    async fn terminate_recovery_instances(
        &self,
        scope: &CallScope,
        recovery_instance_ids: &[String],
    ) -> Result<TerminateJob>;

    async fn describe_job_log_items(
        &self,
        scope: &CallScope,
        job_id: &str,
    ) -> Result<Vec<JobLogItem>>;
}
