//! Outbound events (spec §6.5) — a capability parameter, not a framework
//! hook (spec §9): the engine must run with a no-op sink, and delivery is
//! best-effort. The audit log, not this sink, is the authoritative record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit::AuditSeverity;
use crate::domain::{ExecutionId, ExecutionStatus, RecoveryPlanId};

/// One outbound notification, published on every Execution state
/// transition and every wave terminal status (spec §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    pub plan_id: RecoveryPlanId,
    pub status: ExecutionStatus,
    pub wave_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub severity: AuditSeverity,
}

/// Pluggable notification collaborator (spec §6.5, §9). Delivery failures
/// must never affect engine state — callers log and move on.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ExecutionEvent);
}

/// Default sink: drops every event. The engine must be fully functional
/// wired to this (spec §9).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: ExecutionEvent) {}
}

/// Reference sink that emits each event as a structured `tracing` record,
/// useful when no external notification collaborator is wired up yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn publish(&self, event: ExecutionEvent) {
        match event.severity {
            AuditSeverity::Error | AuditSeverity::Critical => warn!(
                execution_id = %event.execution_id,
                plan_id = %event.plan_id,
                status = ?event.status,
                wave_number = ?event.wave_number,
                "execution event"
            ),
            AuditSeverity::Info | AuditSeverity::Warning => debug!(
                execution_id = %event.execution_id,
                plan_id = %event.plan_id,
                status = ?event.status,
                wave_number = ?event.wave_number,
                "execution event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event() -> ExecutionEvent {
        ExecutionEvent {
            execution_id: ExecutionId(Uuid::new_v4()),
            plan_id: RecoveryPlanId(Uuid::new_v4()),
            status: ExecutionStatus::Running,
            wave_number: Some(1),
            timestamp: Utc::now(),
            severity: AuditSeverity::Info,
        }
    }

    #[tokio::test]
    async fn noop_sink_accepts_any_event() {
        NoopEventSink.publish(event()).await;
    }

    #[tokio::test]
    async fn logging_sink_accepts_any_event() {
        LoggingEventSink.publish(event()).await;
    }
}
