//! Client-side errors.

use thiserror::Error;

/// Errors from the local session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No per-user configuration directory on this platform.
    #[error("Could not determine a configuration directory")]
    NoConfigDir,

    #[error("Session file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from talking to the portal.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid portal base URL.
    #[error("Invalid portal URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid email address.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] patient_portal_core::EmailError),

    /// Network or TLS failure.
    #[error("Request to portal failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The portal answered with an error envelope.
    #[error("Portal returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The portal answered 2xx but the body was not what we expected.
    #[error("Unexpected portal response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Whether the portal rejected the session itself.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}
