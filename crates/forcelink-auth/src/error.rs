//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid connected-app configuration; must be fixed by the integrator
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation requiring a token invoked with none stored
    #[error("No authenticated user")]
    NotAuthenticated,

    /// The identity provider rejected the refresh token; the session has
    /// been cleared and the user must log in again
    #[error("Token refresh rejected: HTTP {status}")]
    RefreshFailed { status: u16, body: String },

    /// Transport-level failure reaching the identity provider; the session
    /// is preserved and the operation can be retried later
    #[error("Identity provider unreachable")]
    Unreachable(#[source] reqwest::Error),

    /// HTTP 401 from a protected resource; refresh the session and retry
    #[error("Session expired")]
    SessionExpired,

    /// Any other non-2xx from a protected resource
    #[error("Server response unsuccessful: HTTP {status}")]
    ServerUnsuccessful { status: u16, body: String },

    /// Invalid transition in the session state machine
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Store error: {0}")]
    Store(#[from] forcelink_store::StoreError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Returns true if the identity provider could not be reached.
    ///
    /// Callers must not clear the session on this path; the convention is to
    /// re-attempt on the next user-triggered action rather than back off.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, AuthError::Unreachable(_))
    }

    /// Returns true if recovery requires sending the user back to login.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated | AuthError::RefreshFailed { .. }
        )
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_failed_requires_login() {
        let err = AuthError::RefreshFailed {
            status: 400,
            body: "expired".to_string(),
        };
        assert!(err.requires_login());
        assert!(!err.is_unreachable());
    }

    #[test]
    fn test_not_authenticated_requires_login() {
        assert!(AuthError::NotAuthenticated.requires_login());
    }

    #[test]
    fn test_session_expired_does_not_require_login() {
        // 401 from a protected resource is recovered by refreshing, not by
        // restarting the login flow.
        assert!(!AuthError::SessionExpired.requires_login());
    }

    #[test]
    fn test_server_unsuccessful_is_not_unreachable() {
        let err = AuthError::ServerUnsuccessful {
            status: 503,
            body: String::new(),
        };
        assert!(!err.is_unreachable());
        assert!(!err.requires_login());
    }
}
