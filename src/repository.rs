//! Repository collaborator interface (spec §6.2) — persistent CRUD for
//! Protection Groups / Recovery Plans / Target Accounts lives outside the
//! core (spec §1); the engine only reads through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountId, ProtectionGroup, ProtectionGroupId, RecoveryPlan, RecoveryPlanId, Region,
    SourceServerId,
};
use crate::error::Result;

/// A target account's assume-role coordinates, as handed to the Credential
/// Broker (spec §4.6, §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAccount {
    pub account_id: AccountId,
    pub role_arn: String,
    pub external_id: String,
    pub region: Region,
}

/// A DRS tag selector used to resolve a group's members at wave-runtime
/// when `ServerSelection::TagExpression` is used (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSelector {
    pub key: String,
    pub value: String,
}

/// External read-only catalog of groups, plans, and target accounts (spec
/// §6.2). `NotFound` is represented as `Ok(None)` rather than an error
/// variant, matching the Repository's own contract ("ProtectionGroup | NotFound").
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_protection_group(&self, id: ProtectionGroupId) -> Result<Option<ProtectionGroup>>;

    async fn resolve_servers_by_tag(
        &self,
        account_id: &AccountId,
        region: &Region,
        tag_selector: &TagSelector,
    ) -> Result<Vec<SourceServerId>>;

    async fn get_recovery_plan(&self, id: RecoveryPlanId) -> Result<Option<RecoveryPlan>>;

    async fn get_target_account(&self, id: &AccountId) -> Result<Option<TargetAccount>>;
}
