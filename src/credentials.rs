//! Credential Broker Interface (spec §4.6) — the core consumes a provider
//! of short-lived, scoped credentials and caches them; it never owns
//! process-wide mutable credential state (spec §9: "a provider interface,
//! not a singleton").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::common::BoundedHashMap;
use crate::config::CredentialCacheConfig;
use crate::domain::{AccountId, Region};
use crate::error::Result;

/// What the caller intends to do with the credentials, in case a provider
/// issues differently-scoped roles per call site (spec §4.6: "given
/// (accountId, region, purpose)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialPurpose {
    DrsControlPlane,
}

/// Opaque, short-lived credentials scoped to the requested account/region/
/// purpose. The engine treats the inner value as opaque (spec §4.6) and
/// only inspects `expires_at`.
#[derive(Debug, Clone)]
pub struct ScopedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl ScopedCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cross-account role-assumption provider (spec §4.6, consumed). The
/// provider — not the engine — owns external-id validation and the actual
/// STS AssumeRole call.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(
        &self,
        account_id: &AccountId,
        region: &Region,
        purpose: CredentialPurpose,
    ) -> Result<ScopedCredentials>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    account_id: AccountId,
    region: Region,
    purpose: PurposeKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PurposeKey {
    Drs,
}

impl From<CredentialPurpose> for PurposeKey {
    fn from(p: CredentialPurpose) -> Self {
        match p {
            CredentialPurpose::DrsControlPlane => PurposeKey::Drs,
        }
    }
}

/// Caches credentials keyed by (accountId, region[, purpose]) behind a
/// bounded LRU (spec §4.6), re-fetching on expiry or on explicit
/// invalidation after an auth-class error (spec §7: `ACCESS_DENIED` /
/// `CREDENTIALS_EXPIRED`).
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    cache: Mutex<BoundedHashMap<CacheKey, ScopedCredentials>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, config: &CredentialCacheConfig) -> Self {
        Self {
            provider,
            cache: Mutex::new(BoundedHashMap::new(config.max_cached_entries)),
        }
    }

    /// Return cached credentials if present and unexpired; otherwise call
    /// the provider and cache the result.
    pub async fn get(
        &self,
        account_id: &AccountId,
        region: &Region,
        purpose: CredentialPurpose,
    ) -> Result<ScopedCredentials> {
        let key = CacheKey {
            account_id: account_id.clone(),
            region: region.clone(),
            purpose: purpose.into(),
        };

        if let Some(cached) = self.cache.lock().get(&key) {
            if !cached.is_expired(Utc::now()) {
                return Ok(cached.clone());
            }
        }

        let fresh = self.provider.get_credentials(account_id, region, purpose).await?;
        self.cache.lock().insert(key, fresh.clone());
        Ok(fresh)
    }

    /// Drop any cached entry for (accountId, region, purpose), forcing the
    /// next `get` to call the provider. Invoked after an auth-class error
    /// (spec §4.6, §7).
    pub fn invalidate(&self, account_id: &AccountId, region: &Region, purpose: CredentialPurpose) {
        let key = CacheKey {
            account_id: account_id.clone(),
            region: region.clone(),
            purpose: purpose.into(),
        };
        self.cache.lock().remove(&key);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Minimum remaining lifetime before credentials are treated as expired and
/// proactively refreshed, guarding against races with an in-flight AWS call.
pub const CREDENTIAL_REFRESH_SKEW: Duration = Duration::from_secs(60);
