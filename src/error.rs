use thiserror::Error;

/// Failures the engine reports to its caller. Input anomalies are never errors;
/// they come back as ordinary classifications.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no monitoring session is active")]
    SessionNotStarted,
    #[error("a monitoring session is already active")]
    SessionAlreadyActive,
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
    #[error("pose source error: {0}")]
    Source(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("rate limited, retry in {remaining_secs}s")]
    RateLimited { remaining_secs: u64 },
    #[error("timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session not found: {0}")]
    NotFound(String),
}
