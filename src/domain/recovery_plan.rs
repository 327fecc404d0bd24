//! RecoveryPlan (spec §3) — external entity, read-only from the core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ProtectionGroupId;

/// Opaque identifier for a Recovery Plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoveryPlanId(pub Uuid);

impl std::fmt::Display for RecoveryPlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One wave of a Recovery Plan: a group to launch plus its dependencies on
/// other waves within the same plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveSpec {
    /// 1-indexed, unique within the plan, dense 1..N (spec §3 invariant).
    pub wave_number: u32,
    pub group_id: ProtectionGroupId,
    /// If true, the Supervisor pauses before handing this wave to the Wave
    /// Runner and waits for an explicit Resume command (spec §4.2).
    pub pause_before_wave: bool,
    /// Wave numbers this wave depends on. Must all be strictly less than
    /// `wave_number` (spec §3 invariant: no forward or cyclic references).
    pub depends_on: Vec<u32>,
}

/// An ordered, dependency-aware collection of waves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub id: RecoveryPlanId,
    pub name: String,
    pub waves: Vec<WaveSpec>,
}

impl RecoveryPlan {
    /// Validate the structural invariants spec §3 assigns to the external
    /// catalog but that the core revalidates on `StartExecution` (spec §9):
    /// dense 1..N wave numbers, `dependsOn` referencing only earlier waves,
    /// no cycles.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::EngineError;

        let mut numbers: Vec<u32> = self.waves.iter().map(|w| w.wave_number).collect();
        numbers.sort_unstable();
        let dense = numbers.iter().enumerate().all(|(i, &n)| n == (i as u32) + 1);
        if !dense || numbers.is_empty() {
            return Err(EngineError::CircularDependency(format!(
                "plan {} does not have dense wave numbers 1..N",
                self.id
            )));
        }

        for wave in &self.waves {
            for &dep in &wave.depends_on {
                if dep >= wave.wave_number {
                    return Err(EngineError::CircularDependency(format!(
                        "wave {} depends on wave {}, which is not strictly earlier",
                        wave.wave_number, dep
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn wave(&self, wave_number: u32) -> Option<&WaveSpec> {
        self.waves.iter().find(|w| w.wave_number == wave_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProtectionGroupId;

    fn group() -> ProtectionGroupId {
        ProtectionGroupId(Uuid::nil())
    }

    #[test]
    fn rejects_forward_dependency() {
        let plan = RecoveryPlan {
            id: RecoveryPlanId(Uuid::nil()),
            name: "p".into(),
            waves: vec![
                WaveSpec {
                    wave_number: 1,
                    group_id: group(),
                    pause_before_wave: false,
                    depends_on: vec![2],
                },
                WaveSpec {
                    wave_number: 2,
                    group_id: group(),
                    pause_before_wave: false,
                    depends_on: vec![],
                },
            ],
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn accepts_linear_chain() {
        let plan = RecoveryPlan {
            id: RecoveryPlanId(Uuid::nil()),
            name: "p".into(),
            waves: vec![
                WaveSpec {
                    wave_number: 1,
                    group_id: group(),
                    pause_before_wave: false,
                    depends_on: vec![],
                },
                WaveSpec {
                    wave_number: 2,
                    group_id: group(),
                    pause_before_wave: false,
                    depends_on: vec![1],
                },
            ],
        };
        assert!(plan.validate().is_ok());
    }
}
