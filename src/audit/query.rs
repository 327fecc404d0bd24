//! Audit trail querying and export (spec §6.4; SPEC_FULL.md §B command
//! audit export). Filtering is in-process over whatever `AuditRecord`s the
//! State Store adapter hands back — the engine has no opinion on how those
//! records are physically stored.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::audit::record::{AuditRecord, AuditSeverity};
use crate::domain::ExecutionId;
use crate::error::{EngineError, Result};

/// Filter applied when listing an execution's audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQueryFilter {
    pub execution_id: Option<ExecutionId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_severity: Option<AuditSeverity>,
    pub limit: Option<usize>,
}

impl AuditQueryFilter {
    pub fn for_execution(execution_id: ExecutionId) -> Self {
        Self {
            execution_id: Some(execution_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(execution_id) = self.execution_id {
            if record.execution_id != execution_id {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        if let Some(min_severity) = self.min_severity {
            if record.severity < min_severity {
                return false;
            }
        }
        true
    }
}

/// Result of applying an `AuditQueryFilter` over a record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQueryResult {
    pub records: Vec<AuditRecord>,
    pub total_matched: usize,
}

/// Apply `filter` over `records`, honoring `filter.limit` on the returned
/// page while `total_matched` reports the unbounded count.
pub fn query(records: &[AuditRecord], filter: &AuditQueryFilter) -> AuditQueryResult {
    let matched: Vec<&AuditRecord> = records.iter().filter(|r| filter.matches(r)).collect();
    let total_matched = matched.len();
    let page = match filter.limit {
        Some(limit) => matched.into_iter().take(limit).cloned().collect(),
        None => matched.into_iter().cloned().collect(),
    };
    AuditQueryResult {
        records: page,
        total_matched,
    }
}

/// Export an execution's audit trail as JSON Lines (SPEC_FULL.md §B), one
/// `AuditRecord` per line — the format operators pipe into `jq` or ship to
/// a log aggregator.
pub async fn export_jsonl<P: AsRef<Path>>(records: &[AuditRecord], output_path: P) -> Result<()> {
    let file = File::create(output_path)
        .await
        .map_err(|e| EngineError::Internal(format!("audit export: {e}")))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| EngineError::Internal(format!("audit export serialization: {e}")))?;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| EngineError::Internal(format!("audit export: {e}")))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| EngineError::Internal(format!("audit export: {e}")))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| EngineError::Internal(format!("audit export: {e}")))?;
    Ok(())
}
