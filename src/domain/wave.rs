//! WaveExecution (spec §3) — child of an Execution, one per wave number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ExecutionId;

/// WaveExecution lifecycle status (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveStatus {
    Pending,
    WaitingPause,
    Launching,
    Polling,
    Completed,
    Failed,
    Partial,
    Skipped,
}

impl WaveStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WaveStatus::Completed | WaveStatus::Failed | WaveStatus::Partial | WaveStatus::Skipped
        )
    }
}

/// One wave's execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveExecution {
    pub execution_id: ExecutionId,
    pub wave_number: u32,
    pub status: WaveStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub server_count: usize,
}

impl WaveExecution {
    pub fn new_pending(execution_id: ExecutionId, wave_number: u32) -> Self {
        Self {
            execution_id,
            wave_number,
            status: WaveStatus::Pending,
            start_time: None,
            end_time: None,
            server_count: 0,
        }
    }

    /// Aggregate a wave's status from its children's terminal statuses per
    /// spec §4.2/§8 invariant 6: COMPLETED iff every launch is LAUNCHED,
    /// FAILED iff every one is FAILED, PARTIAL otherwise. Returns `None` if
    /// any child is still non-terminal (the wave isn't done yet).
    pub fn aggregate(launches: &[crate::domain::ServerLaunch]) -> Option<WaveStatus> {
        use crate::domain::ServerLaunchStatus::*;

        if launches.is_empty() {
            return None;
        }
        if !launches.iter().all(|l| l.status.is_terminal()) {
            return None;
        }

        let all_launched = launches.iter().all(|l| l.status == Launched);
        let all_failed = launches.iter().all(|l| l.status == Failed);

        Some(if all_launched {
            WaveStatus::Completed
        } else if all_failed {
            WaveStatus::Failed
        } else {
            WaveStatus::Partial
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionId, ServerLaunch, ServerLaunchStatus};

    fn launch(status: ServerLaunchStatus) -> ServerLaunch {
        ServerLaunch {
            execution_id: ExecutionId::new(),
            wave_number: 1,
            source_server_id: "s-1".into(),
            drs_job_id: None,
            recovery_instance_id: None,
            status,
            error_code: None,
            error_message: None,
            last_polled_at: None,
        }
    }

    #[test]
    fn aggregate_completed_when_all_launched() {
        let launches = vec![
            launch(ServerLaunchStatus::Launched),
            launch(ServerLaunchStatus::Launched),
        ];
        assert_eq!(WaveExecution::aggregate(&launches), Some(WaveStatus::Completed));
    }

    #[test]
    fn aggregate_partial_on_mixed_outcomes() {
        let launches = vec![
            launch(ServerLaunchStatus::Launched),
            launch(ServerLaunchStatus::Failed),
        ];
        assert_eq!(WaveExecution::aggregate(&launches), Some(WaveStatus::Partial));
    }

    #[test]
    fn aggregate_none_while_any_launch_non_terminal() {
        let launches = vec![launch(ServerLaunchStatus::Launching)];
        assert_eq!(WaveExecution::aggregate(&launches), None);
    }
}
