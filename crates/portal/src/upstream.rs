//! Shared plumbing for calls to upstream services.
//!
//! Every upstream client (CRM, messenger, WooCommerce, meetings, Canada Post)
//! reports failures through [`UpstreamError`] so route handlers can mirror the
//! upstream status and message in one place.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;

/// Maximum number of characters of a body copied into logs or error messages.
pub const BODY_PREVIEW_CHARS: usize = 500;

/// A failed call to an upstream service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request never produced a response.
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with an error status or an explicit failure flag.
    #[error("{service} returned {status}: {message}")]
    Status {
        service: &'static str,
        status: StatusCode,
        message: String,
        details: Option<Value>,
    },

    /// The upstream answered 2xx but the body was not what we expected.
    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    /// The status the portal should answer with.
    ///
    /// Upstream error statuses are mirrored; everything else is a 500.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } if status.is_client_error() || status.is_server_error() => {
                *status
            }
            Self::Status { .. } => StatusCode::BAD_REQUEST,
            Self::Transport { .. } | Self::Decode { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            Self::Transport { service, .. } | Self::Decode { service, .. } => {
                format!("Failed to reach {service}")
            }
        }
    }

    /// Upstream error body, when one was returned.
    #[must_use]
    pub const fn details(&self) -> Option<&Value> {
        match self {
            Self::Status { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Whether the upstream rejected our credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    pub(crate) fn decode(service: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            service,
            message: message.into(),
        }
    }
}

/// Why a proxied call did not produce a payload.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No session token was available; nothing was sent.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Required configuration is missing; nothing was sent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Turn a non-success response into an [`UpstreamError::Status`].
pub async fn read_failure(service: &'static str, response: reqwest::Response) -> UpstreamError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<Value>(&text).ok();
    let message = details
        .as_ref()
        .and_then(error_message_from_body)
        .unwrap_or_else(|| fallback_message(status, &text));

    tracing::warn!(
        service,
        status = %status,
        body = %truncate(&text, BODY_PREVIEW_CHARS),
        "Upstream returned error status"
    );

    UpstreamError::Status {
        service,
        status,
        message,
        details,
    }
}

/// A decoded JSON response plus the headers it came with.
#[derive(Debug)]
pub struct JsonResponse {
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send a request and decode a JSON body, mapping every failure mode.
///
/// # Errors
///
/// Returns [`UpstreamError`] for transport failures, error statuses and
/// bodies that are not JSON.
pub async fn send_json(
    service: &'static str,
    request: reqwest::RequestBuilder,
    debug_payloads: bool,
) -> Result<JsonResponse, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|source| UpstreamError::Transport { service, source })?;

    let status = response.status();
    tracing::debug!(
        service,
        path = %response.url().path(),
        status = %status,
        "Upstream responded"
    );
    crate::error::add_breadcrumb(service, &format!("{status} {}", response.url().path()));
    if !status.is_success() {
        return Err(read_failure(service, response).await);
    }

    let headers = response.headers().clone();
    let text = response
        .text()
        .await
        .map_err(|source| UpstreamError::Transport { service, source })?;
    log_payload(debug_payloads, service, "response", &text);

    let body =
        serde_json::from_str(&text).map_err(|e| UpstreamError::decode(service, e.to_string()))?;
    Ok(JsonResponse { headers, body })
}

/// Pull a human readable message out of an upstream error body.
///
/// Looks at `message`, `error`, `msg` and `error.message` in that order.
#[must_use]
pub fn error_message_from_body(body: &Value) -> Option<String> {
    let direct = ["message", "error", "msg"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str));
    let nested = || body.pointer("/error/message").and_then(Value::as_str);
    direct
        .or_else(nested)
        .filter(|m| !m.trim().is_empty())
        .map(String::from)
}

fn fallback_message(status: StatusCode, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Upstream request failed")
            .to_string()
    } else {
        truncate(text, BODY_PREVIEW_CHARS).to_string()
    }
}

/// Truncate to at most `max` characters, on a char boundary.
#[must_use]
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text.get(..idx).unwrap_or(text),
        None => text,
    }
}

/// Log an upstream payload at debug level when payload logging is enabled.
pub fn log_payload(enabled: bool, service: &'static str, direction: &'static str, body: &str) {
    if enabled {
        tracing::debug!(
            service,
            direction,
            body = %truncate(body, BODY_PREVIEW_CHARS),
            "Upstream payload"
        );
    }
}
