//! AuditRecord (spec §3, §6.4) — the append-only log entry type. Every
//! status transition, command acceptance/rejection, and AWS call envelope
//! is recorded here, keyed by (executionId, sequence) per the `audit_log`
//! table layout in spec §6.4.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountId, CommandId, ExecutionId, ExecutionStatus, Region, ServerLaunchStatus,
    SourceServerId, WaveStatus,
};

/// Severity used to prioritize audit records in dashboards/alerting built on
/// top of this log; storage and ordering never depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Outcome of one sanitized AWS call envelope (spec §4.5: "every AWS call
/// envelope (method, inputs hash, outcome, latency, error code)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwsCallOutcome {
    Success,
    Failure,
}

/// What happened, as a closed set of variants rather than a free-text
/// message — keeps the log machine-queryable (spec §6.4, §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditRecordKind {
    ExecutionStatusChanged {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    WaveStatusChanged {
        wave_number: u32,
        from: WaveStatus,
        to: WaveStatus,
    },
    ServerLaunchStatusChanged {
        wave_number: u32,
        source_server_id: SourceServerId,
        from: ServerLaunchStatus,
        to: ServerLaunchStatus,
    },
    CommandAccepted {
        command_id: CommandId,
    },
    CommandRejected {
        command_id: CommandId,
        reason: String,
    },
    /// A bulk Terminate-Recovery-Instances job issued by `TERMINATE_INSTANCES`
    /// (spec §4.1, §6.1). There is no separate terminate-job table in §6.4's
    /// persisted-state layout, so this audit record is the side execution
    /// record spec §4.1 calls for.
    InstancesTerminationRequested {
        terminate_job_id: String,
        recovery_instance_ids: Vec<String>,
    },
    /// A sanitized envelope around one call through `DrsClient` (spec §6.3,
    /// §4.5). Inputs are hashed rather than stored verbatim so payloads
    /// containing customer identifiers never land in the audit log.
    AwsCallEnvelope {
        method: String,
        account_id: AccountId,
        region: Region,
        inputs_hash: u64,
        outcome: AwsCallOutcome,
        latency_ms: u64,
        error_code: Option<String>,
    },
}

/// One append-only entry, keyed by (executionId, sequence) per spec §6.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub execution_id: ExecutionId,
    /// Monotonically increasing per `execution_id`; assigned by whatever
    /// appends the record (the State Store adapter).
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: AuditSeverity,
    pub kind: AuditRecordKind,
}

impl AuditRecord {
    pub fn new(
        execution_id: ExecutionId,
        sequence: u64,
        severity: AuditSeverity,
        kind: AuditRecordKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id,
            sequence,
            timestamp: now,
            severity,
            kind,
        }
    }
}
