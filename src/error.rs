//! Error taxonomy for the execution engine (spec §7).
//!
//! One flat enum, the way the teacher's `DbError` is shaped, but scoped to
//! the kinds this domain actually produces rather than a storage engine's.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A single error kind, covering every code named in spec §7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ---- Validation: reported synchronously, never reach the Supervisor ----
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("wave size limit exceeded: {0} servers (max 100)")]
    WaveSizeLimitExceeded(usize),
    #[error("circular dependency in recovery plan: {0}")]
    CircularDependency(String),
    #[error("invalid server ids: {0}")]
    InvalidServerIds(String),
    #[error("no matching servers for wave {0}")]
    NoMatchingServers(u32),
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ---- Conflict: reported to the Command Gateway ----
    #[error("plan {0} already has a non-terminal execution")]
    PlanAlreadyExecuting(String),
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),
    #[error("execution not in a pausable/resumable state: {0}")]
    ExecutionNotInPausableState(String),

    // ---- Capacity: wave-level, bounded retries before surfacing ----
    #[error("concurrent DRS jobs limit exceeded for account {0}")]
    ConcurrentJobsLimitExceeded(String),
    #[error("DRS quota exceeded: {0}")]
    QuotaExceeded(String),

    // ---- Auth: triggers a credential-broker refresh ----
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("credentials expired for account {0} region {1}")]
    CredentialsExpired(String, String),
    #[error("authentication failed after {0} consecutive attempts")]
    AuthFailed(u32),

    // ---- Transient: retried with exponential backoff + jitter ----
    #[error("throttled by AWS: {0}")]
    Throttling(String),
    #[error("AWS service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("network error: {0}")]
    NetworkError(String),

    // ---- DRS job failure: recorded on the ServerLaunch ----
    #[error("DRS launch failed: {0}")]
    LaunchFailed(String),
    #[error("poll timeout exceeded for job {0}")]
    PollTimeout(String),

    // ---- Fatal ----
    #[error("internal error: {0}")]
    Internal(String),
}

/// High-level kind used by the retry/backoff and credential-refresh logic
/// (`orchestration::error_recovery`) to decide how to react to an error
/// without matching every variant at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Capacity,
    Auth,
    Transient,
    JobFailure,
    Fatal,
}

impl EngineError {
    /// Classify this error per spec §7's propagation policy.
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            MissingField(_) | InvalidName(_) | WaveSizeLimitExceeded(_)
            | CircularDependency(_) | InvalidServerIds(_) | NoMatchingServers(_)
            | InvalidRequest(_) => ErrorKind::Validation,

            PlanAlreadyExecuting(_) | VersionConflict { .. } | ExecutionNotFound(_)
            | ExecutionNotInPausableState(_) => ErrorKind::Conflict,

            ConcurrentJobsLimitExceeded(_) | QuotaExceeded(_) => ErrorKind::Capacity,

            AccessDenied(_) | CredentialsExpired(_, _) | AuthFailed(_) => ErrorKind::Auth,

            Throttling(_) | ServiceUnavailable(_) | NetworkError(_) => ErrorKind::Transient,

            LaunchFailed(_) | PollTimeout(_) => ErrorKind::JobFailure,

            Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether an operation that produced this error may simply be retried
    /// after a backoff, per spec §7.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// A stable, uppercase error code string for audit records and API
    /// responses (e.g. `PLAN_ALREADY_EXECUTING`), matching the codes named
    /// in spec §7 verbatim.
    pub fn code(&self) -> &'static str {
        use EngineError::*;
        match self {
            MissingField(_) => "MISSING_FIELD",
            InvalidName(_) => "INVALID_NAME",
            WaveSizeLimitExceeded(_) => "WAVE_SIZE_LIMIT_EXCEEDED",
            CircularDependency(_) => "CIRCULAR_DEPENDENCY",
            InvalidServerIds(_) => "INVALID_SERVER_IDS",
            NoMatchingServers(_) => "NO_MATCHING_SERVERS",
            InvalidRequest(_) => "INVALID_REQUEST",
            PlanAlreadyExecuting(_) => "PLAN_ALREADY_EXECUTING",
            VersionConflict { .. } => "VERSION_CONFLICT",
            ExecutionNotFound(_) => "EXECUTION_NOT_FOUND",
            ExecutionNotInPausableState(_) => "EXECUTION_NOT_IN_PAUSABLE_STATE",
            ConcurrentJobsLimitExceeded(_) => "CONCURRENT_JOBS_LIMIT_EXCEEDED",
            QuotaExceeded(_) => "QUOTA_EXCEEDED",
            AccessDenied(_) => "ACCESS_DENIED",
            CredentialsExpired(_, _) => "CREDENTIALS_EXPIRED",
            AuthFailed(_) => "AUTH_FAILED",
            Throttling(_) => "THROTTLING",
            ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            NetworkError(_) => "NETWORK_ERROR",
            LaunchFailed(_) => "LAUNCH_FAILED",
            PollTimeout(_) => "POLL_TIMEOUT",
            Internal(_) => "INTERNAL_ERROR",
        }
    }
}
