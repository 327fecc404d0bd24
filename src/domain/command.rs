//! Command (spec §3, §6.1) — external control signal, consumed at most
//! once (idempotency, spec §8 invariant 3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ExecutionId, ExecutionType, RecoveryPlanId};

/// Opaque identifier for a Command; also its idempotency dedupe key
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

/// Tagged-variant command payloads, replacing the "dynamic invocation
/// dispatch on string `operation`" pattern the source used (spec §9):
/// `CommandGateway::submit` matches exhaustively, so an unhandled kind is a
/// compile error rather than a runtime `INVALID_REQUEST`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandKind {
    StartExecution {
        plan_id: RecoveryPlanId,
        execution_type: ExecutionType,
        execution_name: Option<String>,
        description: Option<String>,
    },
    PauseExecution {
        reason: Option<String>,
    },
    ResumeExecution {
        notes: Option<String>,
    },
    CancelExecution {
        reason: Option<String>,
    },
    TerminateInstances,
}

/// A single submitted command, persisted before it is acted on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    /// `None` only for `StartExecution`, which creates the Execution it
    /// refers to rather than addressing an existing one.
    pub execution_id: Option<ExecutionId>,
    pub kind: CommandKind,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_reason: Option<String>,
}

impl Command {
    pub fn new(
        execution_id: Option<ExecutionId>,
        kind: CommandKind,
        requested_by: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CommandId::new(),
            execution_id,
            kind,
            requested_by,
            requested_at: now,
            consumed_at: None,
            accepted_at: None,
            rejected_reason: None,
        }
    }
}
