//! # Audit Trail
//!
//! Every Execution/WaveExecution/ServerLaunch status transition, command
//! acceptance/rejection, and AWS call envelope is recorded as an
//! `AuditRecord`, append-only, keyed by (executionId, sequence) (spec §3,
//! §6.4). The State Store adapter is what actually appends these records
//! durably (spec §4.5); this module owns only the record shape and the
//! query/export surface used to read it back.

pub mod query;
pub mod record;

pub use query::{export_jsonl, query, AuditQueryFilter, AuditQueryResult};
pub use record::{AuditRecord, AuditRecordKind, AuditSeverity, AwsCallOutcome};
