use thiserror::Error;

/// Error kinds raised across the ingestion pipeline, matching the taxonomy
/// each component is required to report against (network, extraction,
/// validation, concurrency, storage).
#[derive(Debug, Error)]
pub enum SentryFeedError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("dns resolution failed: {0}")]
    Dns(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("http {status}: {detail}")]
    Http4xx { status: u16, detail: String },

    #[error("http {status}: {detail}")]
    Http5xx { status: u16, detail: String },

    #[error("remote rate limit: {0}")]
    RateLimitedRemote(String),

    #[error("local rate limiter exceeded max_wait for host {0}")]
    RateLimitedLocal(String),

    #[error("robots.txt disallows fetch: {0}")]
    RobotsDisallowed(String),

    #[error("redirect left source scope: {0}")]
    OutOfScope(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("duplicate({kind}): canonical article {canonical_id}")]
    Duplicate {
        kind: DuplicateKind,
        canonical_id: uuid::Uuid,
    },

    #[error("concurrent execution blocked for source {0}")]
    ConcurrentExecutionBlocked(uuid::Uuid),

    #[error("storage conflict: {0}")]
    StorageConflict(String),

    #[error("partial failure: {processed} processed, {failed} failed")]
    PartialFailure { processed: usize, failed: usize },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Exact,
    Near,
}

impl std::fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateKind::Exact => write!(f, "exact"),
            DuplicateKind::Near => write!(f, "near"),
        }
    }
}

impl SentryFeedError {
    /// The stable `error_kind` string persisted on a `SourceCheck` row.
    pub fn kind(&self) -> &'static str {
        match self {
            SentryFeedError::Network(_) => "network",
            SentryFeedError::Timeout(_) => "timeout",
            SentryFeedError::Dns(_) => "dns",
            SentryFeedError::Tls(_) => "tls",
            SentryFeedError::Http4xx { .. } => "http_4xx",
            SentryFeedError::Http5xx { .. } => "http_5xx",
            SentryFeedError::RateLimitedRemote(_) => "rate_limited_remote",
            SentryFeedError::RateLimitedLocal(_) => "rate_limited_local",
            SentryFeedError::RobotsDisallowed(_) => "robots_disallowed",
            SentryFeedError::OutOfScope(_) => "out_of_scope",
            SentryFeedError::ExtractionFailed(_) => "extraction_failed",
            SentryFeedError::Validation(_) => "validation",
            SentryFeedError::Duplicate { .. } => "duplicate",
            SentryFeedError::ConcurrentExecutionBlocked(_) => "concurrent_execution_blocked",
            SentryFeedError::StorageConflict(_) => "storage_conflict",
            SentryFeedError::PartialFailure { .. } => "partial_failure",
            SentryFeedError::Fatal(_) => "fatal",
            SentryFeedError::Anyhow(_) => "fatal",
        }
    }

    /// Whether the HTTP client should retry this error per the backoff policy in §4.A.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SentryFeedError::Network(_)
                | SentryFeedError::Timeout(_)
                | SentryFeedError::Dns(_)
                | SentryFeedError::Http5xx { .. }
                | SentryFeedError::RateLimitedRemote(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SentryFeedError>;
