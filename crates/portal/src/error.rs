//! Unified error handling with Sentry integration.
//!
//! Every route returns `Result<T, AppError>`. Errors render as the portal's
//! JSON envelope `{"success": false, "error": "...", "details": ...}`, and
//! server-side failures are captured to Sentry before responding.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::ConfigError;
use crate::upstream::{ProxyError, UpstreamError};

/// Application-level error type for the portal.
#[derive(Debug, Error)]
pub enum AppError {
    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An upstream service call failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// A multi-step update stopped partway through.
    #[error("Partial update ({completed} succeeded, {failed} failed): {source}")]
    PartialUpdate {
        completed: &'static str,
        failed: &'static str,
        data: Value,
        #[source]
        source: UpstreamError,
    },

    /// Caller has no session.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but may not touch this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body over the route's size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Unauthenticated => Self::Unauthorized("Not authenticated".to_string()),
            ProxyError::Config(e) => Self::Config(e),
            ProxyError::Upstream(e) => Self::Upstream(e),
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(err) => err.status_code(),
            Self::PartialUpdate { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn client_message(&self) -> String {
        match self {
            // Don't expose which variable is missing to clients
            Self::Config(_) => "Internal server error".to_string(),
            Self::Upstream(err) => err.client_message(),
            Self::PartialUpdate {
                completed,
                failed,
                source,
                ..
            } => format!(
                "{completed} updated but {failed} update failed: {}",
                source.client_message()
            ),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::PayloadTooLarge(msg) => msg.clone(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Upstream(err) => err.details().cloned(),
            Self::PartialUpdate {
                completed,
                data,
                source,
                ..
            } => Some(json!({
                "completed": completed,
                "data": data,
                "upstream": source.details(),
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let mut body = json!({
            "success": false,
            "error": self.client_message(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a proxied upstream call.
pub fn add_breadcrumb(category: &str, message: &str) {
    sentry::add_breadcrumb(sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    });
}
