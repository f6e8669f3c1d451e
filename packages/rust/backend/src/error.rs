//! Closed error-kind enumeration for generation backend calls.
//!
//! Retry policy dispatches over [`BackendError::is_transient`], never over
//! message text. Raw transport errors are classified exactly once, at the
//! client edge (see `client::classify_transport`).

use draftforge_shared::DraftforgeError;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Everything a generation call can fail with, by kind.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request exceeded the per-call deadline. Transient.
    #[error("backend timeout: {0}")]
    Timeout(String),

    /// Connection-level failure (refused, reset, DNS). Transient.
    #[error("connection error: {0}")]
    Connection(String),

    /// TLS certificate verification failed. Not retried; carries the
    /// remediation hint because retrying can never fix a trust problem.
    #[error(
        "TLS certificate verification failed: {0}. If you are behind an \
         intercepting proxy, set ssl_verify = false in the [backend] config \
         section."
    )]
    Ssl(String),

    /// Bad or missing API credentials. Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit or quota exhaustion. Never retried; distinct so callers
    /// can back off and resume later.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Any other non-success API response.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The completion payload did not have the expected shape.
    #[error("malformed backend response: {0}")]
    Parse(String),
}

impl BackendError {
    /// Whether the in-stage retry loop should try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout(_) | BackendError::Connection(_))
    }
}

impl From<BackendError> for DraftforgeError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Auth(msg) => DraftforgeError::Auth(msg),
            BackendError::Quota(msg) => DraftforgeError::Quota(msg),
            other => DraftforgeError::Backend(other.to_string()),
        }
    }
}
