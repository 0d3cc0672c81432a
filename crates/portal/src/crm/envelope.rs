//! CRM response envelopes and per-resource shape normalization.
//!
//! The CRM wraps payloads inconsistently. Observed variants:
//!
//! - `{"status": true, "data": {"orders": {"data": [...], "current_page": 1}}}`
//! - `{"status": true, "data": {"orders": [...]}}`
//! - `{"status": true, "orders": [...]}`
//! - `{"status": true, "data": [...]}`
//! - a bare array
//!
//! Each resource has one function here that knows every variant. Shapes that
//! match none of them fall back to the unwrapped payload so callers can still
//! inspect it.

use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::upstream::{UpstreamError, error_message_from_body};

/// A decoded CRM response.
#[derive(Debug, Clone, PartialEq)]
pub struct CrmPayload {
    /// `envelope.data` when present and non-null, else the envelope itself.
    pub data: Value,
    /// The body exactly as the CRM sent it.
    pub envelope: Value,
}

impl CrmPayload {
    /// Unwrap a successful response body.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Status`] when the body carries an explicit
    /// `status: false` or `success: false` flag despite the 2xx status.
    pub fn from_envelope(status: StatusCode, envelope: Value) -> Result<Self, UpstreamError> {
        if is_flagged_failure(&envelope) {
            return Err(UpstreamError::Status {
                service: "crm",
                status,
                message: error_message_from_body(&envelope)
                    .unwrap_or_else(|| "CRM request failed".to_string()),
                details: Some(envelope),
            });
        }

        let data = match envelope.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => envelope.clone(),
        };
        Ok(Self { data, envelope })
    }

    /// Normalize a list resource (`orders`, `subscriptions`).
    #[must_use]
    pub fn list(&self, key: &str) -> Value {
        list(&self.envelope, key).unwrap_or_else(|| self.data.clone())
    }

    /// Pagination metadata that accompanied a list, if any.
    #[must_use]
    pub fn pagination(&self, key: &str) -> Option<Value> {
        pagination(&self.envelope, key)
    }

    /// Normalize a user record.
    #[must_use]
    pub fn user(&self) -> Value {
        user(&self.envelope).unwrap_or_else(|| self.data.clone())
    }

    /// The bearer token returned by login, wherever the CRM put it.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        ["/data/token", "/token", "/data/access_token", "/access_token"]
            .iter()
            .find_map(|pointer| self.envelope.pointer(pointer).and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .map(String::from)
    }
}

fn is_flagged_failure(envelope: &Value) -> bool {
    ["status", "success"]
        .iter()
        .any(|key| envelope.get(*key) == Some(&Value::Bool(false)))
}

fn list(envelope: &Value, key: &str) -> Option<Value> {
    if envelope.is_array() {
        return Some(envelope.clone());
    }
    [
        format!("/data/{key}/data"),
        format!("/data/{key}"),
        format!("/{key}/data"),
        format!("/{key}"),
        "/data".to_string(),
    ]
    .iter()
    .filter_map(|pointer| envelope.pointer(pointer))
    .find(|candidate| candidate.is_array())
    .cloned()
}

fn pagination(envelope: &Value, key: &str) -> Option<Value> {
    // Laravel-style paginator: the list object itself carries the metadata
    for pointer in [format!("/data/{key}"), format!("/{key}")] {
        if let Some(Value::Object(paginator)) = envelope.pointer(&pointer)
            && paginator.get("data").is_some_and(Value::is_array)
        {
            let meta: Map<String, Value> = paginator
                .iter()
                .filter(|(k, _)| k.as_str() != "data")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return Some(Value::Object(meta));
        }
    }

    ["/data/pagination", "/pagination", "/meta"]
        .iter()
        .find_map(|pointer| envelope.pointer(pointer))
        .filter(|v| v.is_object())
        .cloned()
}

fn user(envelope: &Value) -> Option<Value> {
    ["/data/user", "/user", "/data"]
        .iter()
        .filter_map(|pointer| envelope.pointer(pointer))
        .find(|candidate| candidate.is_object())
        .cloned()
}
