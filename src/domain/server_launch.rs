//! ServerLaunch (spec §3) — child of a WaveExecution, one per
//! (waveNumber, sourceServerId) pair (spec §3 invariant).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionId, SourceServerId};

/// ServerLaunch lifecycle status (spec §3). `Cancelled` is produced when
/// an Execution enters CANCELLING before this launch's DRS job was issued
/// (spec §4.4's cancellation contract); it is not named in the entity
/// table of spec §3 but is required by §4.4 and is folded under `Failed`
/// aggregation semantics (a cancelled launch is not `Launched`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerLaunchStatus {
    Pending,
    Launching,
    Launched,
    Failed,
    Cancelled,
}

impl ServerLaunchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerLaunchStatus::Launched
                | ServerLaunchStatus::Failed
                | ServerLaunchStatus::Cancelled
        )
    }
}

/// One server's recovery-launch record within a wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLaunch {
    pub execution_id: ExecutionId,
    pub wave_number: u32,
    pub source_server_id: SourceServerId,
    pub drs_job_id: Option<String>,
    pub recovery_instance_id: Option<String>,
    pub status: ServerLaunchStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl ServerLaunch {
    pub fn new_pending(
        execution_id: ExecutionId,
        wave_number: u32,
        source_server_id: SourceServerId,
    ) -> Self {
        Self {
            execution_id,
            wave_number,
            source_server_id,
            drs_job_id: None,
            recovery_instance_id: None,
            status: ServerLaunchStatus::Pending,
            error_code: None,
            error_message: None,
            last_polled_at: None,
        }
    }

    pub fn fail(&mut self, error_code: impl Into<String>, error_message: impl Into<String>) {
        self.status = ServerLaunchStatus::Failed;
        self.error_code = Some(error_code.into());
        self.error_message = Some(error_message.into());
    }
}
