//! Access-control error types.

use http::StatusCode;

/// Why a request was not let through.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AccessError {
    /// No [`User`](crate::User) in the request extensions; the identity
    /// layer is missing or misordered.
    #[error("request user is not initialized")]
    MissingUser,

    /// An authenticated user whose account is disabled.
    #[error("Inactive user")]
    Inactive,

    /// The access rule did not grant the request.
    #[error("Unauthorized")]
    Unauthorized,

    /// The engine failed while evaluating the rule.
    #[error("access check failed: {0}")]
    Engine(#[from] warden_core::Error),
}

impl AccessError {
    /// Whether this error should result in a 401 (vs. a 500).
    pub fn is_client_error(&self) -> bool {
        matches!(self, AccessError::Inactive | AccessError::Unauthorized)
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
