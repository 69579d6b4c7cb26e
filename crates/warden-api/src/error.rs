//! Error types for warden-api

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

/// Result type alias for warden-api operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in warden-api
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from the engine
    #[error("Core error: {0}")]
    Core(#[from] warden_core::Error),

    /// The caller is a guest, inactive, or unknown.
    #[error("Unauthorized")]
    Unauthorized,

    /// The caller may not see the requested view.
    #[error("Forbidden")]
    Forbidden,

    /// Could not bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl Error {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
        }
        let body = serde_json::json!({
            "error": {
                "status": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}
