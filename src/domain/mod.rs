//! Data model (spec §3): Protection Groups and Recovery Plans (external,
//! read by the core), and the Execution/WaveExecution/ServerLaunch/Command
//! entities the core owns.

mod command;
mod execution;
mod protection_group;
mod recovery_plan;
mod server_launch;
mod wave;

pub use command::{Command, CommandKind};
pub use execution::{Execution, ExecutionId, ExecutionStatus, ExecutionType};
pub use protection_group::{
    LaunchConfig, LaunchDisposition, LicensingMode, ProtectionGroup, ProtectionGroupId,
    RightSizingMethod, ServerSelection,
};
pub use recovery_plan::{RecoveryPlan, RecoveryPlanId, WaveSpec};
pub use server_launch::{ServerLaunch, ServerLaunchStatus};
pub use wave::{WaveExecution, WaveStatus};

/// Stable opaque identifier, backed by a UUID. Newtypes wrap this per
/// entity (`ExecutionId`, `ProtectionGroupId`, ...) so the compiler catches
/// a `ProtectionGroupId` passed where a `RecoveryPlanId` is expected.
pub type Id = uuid::Uuid;

/// Source server identifier as known to DRS. DRS ids are opaque strings
/// (`s-xxxxxxxxxxxxxxxxx`), not UUIDs, so this is a thin string newtype
/// rather than an `Id`.
pub type SourceServerId = String;

/// AWS account id (12 digits) of a target account.
pub type AccountId = String;

/// AWS region code (e.g. `us-east-1`).
pub type Region = String;
