//! Engine configuration (SPEC_FULL.md §A.3).
//!
//! Nested config-with-defaults, the way the teacher's `core::CoreConfig`
//! groups `BufferPoolConfig`/`IoConfig`/`WorkerConfig` together. No file
//! parser lives here — loading TOML/JSON/env is an embedder's job — but
//! every field is `Deserialize` so an embedder can hand us a parsed blob.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub poller: PollerConfig,
    pub concurrency: ConcurrencyConfig,
    pub credential_cache: CredentialCacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            credential_cache: CredentialCacheConfig::default(),
        }
    }
}

/// Job Poller tuning (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Delay after a job launches before the first poll.
    pub initial_delay: Duration,
    /// Base of the geometric backoff.
    pub backoff_base: Duration,
    /// Multiplicative backoff factor per tick.
    pub backoff_factor: f64,
    /// Upper bound on the per-job poll delay.
    pub backoff_cap: Duration,
    /// Jitter applied to each computed delay, as a fraction (0.2 == ±20%).
    pub jitter_fraction: f64,
    /// Maximum time a job may remain non-terminal before it is failed with
    /// `POLL_TIMEOUT`.
    pub max_job_lifetime: Duration,
    /// Consecutive hard auth/permission errors before forcing a credential
    /// refresh and, if still failing, an `AUTH_FAILED` wave failure.
    pub max_consecutive_auth_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            backoff_base: Duration::from_secs(10),
            backoff_factor: 1.5,
            backoff_cap: Duration::from_secs(60),
            jitter_fraction: 0.2,
            max_job_lifetime: Duration::from_secs(2 * 60 * 60),
            max_consecutive_auth_failures: 3,
        }
    }
}

/// Wave Runner concurrency tuning (spec §4.3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum servers in a single wave before `WAVE_SIZE_LIMIT_EXCEEDED`.
    pub max_wave_size: usize,
    /// Default per-(account,region) concurrent Start-Recovery launches.
    pub max_concurrent_launches_per_account: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_wave_size: 100,
            max_concurrent_launches_per_account: 10,
        }
    }
}

/// Credential Broker cache tuning (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialCacheConfig {
    /// Maximum distinct (accountId, region) credential entries cached at
    /// once before the least-recently-used entry is evicted.
    pub max_cached_entries: usize,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            max_cached_entries: 256,
        }
    }
}
