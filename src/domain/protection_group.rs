//! ProtectionGroup (spec §3) — external entity, read-only from the core's
//! point of view. The core never edits groups; it only resolves them
//! through the `Repository` collaborator (spec §6.2).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountId, Region, SourceServerId};

/// Opaque identifier for a Protection Group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtectionGroupId(pub Uuid);

impl std::fmt::Display for ProtectionGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a group's member servers are selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerSelection {
    /// Explicit, operator-curated list of source server ids.
    Explicit(Vec<SourceServerId>),
    /// A DRS tag expression resolved at wave-runtime via
    /// `Repository::resolve_servers_by_tag`.
    TagExpression(String),
}

/// DRS launch configuration carried by a group (spec §3). The engine treats
/// every field opaquely and never interprets subnet/SG/instance-type
/// semantics itself — but it also never forwards this struct to
/// `DrsClient::start_recovery`, because AWS DRS's real `StartRecovery` API
/// takes no launch-configuration fields: subnet/SG/instance-type/IAM-profile
/// is applied per source server ahead of time via DRS's own
/// launch-configuration APIs, not passed inline with the recovery job. This
/// struct exists so the engine can read and surface a group's configured
/// launch settings (catalog display, validation) without owning them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub subnet_id: Option<String>,
    pub security_group_ids: Vec<String>,
    pub instance_type: Option<String>,
    pub iam_instance_profile: Option<String>,
    pub copy_tags: bool,
    pub copy_private_ip: bool,
    pub licensing: LicensingMode,
    pub right_sizing_method: RightSizingMethod,
    pub launch_disposition: LaunchDisposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicensingMode {
    BringYourOwnLicense,
    NoLicenseConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RightSizingMethod {
    None,
    Basic,
    InAws,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchDisposition {
    Started,
    Stopped,
}

/// A logical bundle of source servers sharing a launch configuration.
/// Owned by the catalog collaborator, not the engine (spec §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionGroup {
    pub id: ProtectionGroupId,
    pub name: String,
    pub target_account_id: AccountId,
    pub region: Region,
    pub server_selection: ServerSelection,
    pub launch_config: LaunchConfig,
}
