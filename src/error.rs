use thiserror::Error;

/// Failures that cross the leaderboard and presence client boundary.
///
/// A submission that does not improve a stored score is not represented here:
/// it is a successful outcome with `improved == false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Malformed username or score. Rejected up front and never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Timeout or connection failure. Retried with a fixed delay, then the
    /// caller falls back to its local cache.
    #[error("store unreachable: {0}")]
    Transient(String),

    /// The remote store answered but failed internally.
    #[error("store failure: {0}")]
    Backend(String),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

impl From<tokio::time::error::Elapsed> for SyncError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SyncError::Transient("request timed out".to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            return SyncError::Transient(error.to_string());
        }
        match error.status() {
            Some(status) if status.is_client_error() => SyncError::Validation(error.to_string()),
            _ => SyncError::Backend(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                SyncError::Transient(error.to_string())
            }
            other => SyncError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Backend(format!("malformed payload: {error}"))
    }
}
