//! Request parsing helpers shared by the route handlers.
//!
//! Validation failures become `AppError::BadRequest` with a message naming the
//! offending field, before any upstream call is made.

use std::num::NonZeroU32;
use std::str::FromStr;

use axum::{
    Json,
    extract::{FromRequest, Request, multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
};
use patient_portal_core::{IdError, UserId, parse_numeric_id};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::AppError;

/// JSON body extractor whose rejection is the portal's 400 envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(&rejection)),
        }
    }
}

fn json_rejection(rejection: &JsonRejection) -> AppError {
    AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
}

/// Largest multipart body accepted by the upload routes.
pub const UPLOAD_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Map a multipart read failure; an over-limit body is a 413, not a parse error.
#[must_use]
pub fn multipart_error(err: &MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!(
            "File too large: uploads are limited to {} MB",
            UPLOAD_BODY_LIMIT / (1024 * 1024)
        ))
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// `{"success": true, "<key>": payload}`.
#[must_use]
pub fn success(key: &str, payload: Value) -> Json<Value> {
    let mut body = json!({ "success": true });
    body[key] = payload;
    Json(body)
}

/// Parse a numeric id taken from the URL path.
///
/// # Errors
///
/// Returns `AppError::BadRequest` naming `what` when the segment is not a
/// positive integer.
pub fn path_id<T>(raw: &str, what: &str) -> Result<T, AppError>
where
    T: FromStr<Err = IdError>,
{
    raw.parse()
        .map_err(|e: IdError| AppError::BadRequest(format!("Invalid {what}: {e}")))
}

/// Reject when the `userId` path segment is not the caller's own id.
///
/// # Errors
///
/// Returns `AppError::Forbidden` on mismatch.
pub fn ensure_same_user(cookie_user_id: &str, path_user_id: UserId) -> Result<(), AppError> {
    match cookie_user_id.parse::<UserId>() {
        Ok(own) if own == path_user_id => Ok(()),
        _ => Err(AppError::Forbidden(
            "You may only access your own records".to_string(),
        )),
    }
}

/// Parse an optional positive integer query parameter.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when present but not a positive integer or
/// above `max`.
pub fn positive_param(
    raw: Option<&str>,
    name: &str,
    max: Option<u32>,
) -> Result<Option<NonZeroU32>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let value = raw
        .parse::<NonZeroU32>()
        .map_err(|_| AppError::BadRequest(format!("{name} must be a positive integer")))?;
    if let Some(max) = max
        && value.get() > max
    {
        return Err(AppError::BadRequest(format!("{name} must be at most {max}")));
    }
    Ok(Some(value))
}

/// Field access over a JSON object body.
pub struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    /// View a body as an object.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for anything but a JSON object.
    pub fn of(body: &'a Value) -> Result<Self, AppError> {
        body.as_object()
            .map(Self)
            .ok_or_else(|| AppError::BadRequest("Request body must be a JSON object".to_string()))
    }

    /// The first present, non-null value among `keys`.
    #[must_use]
    pub fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .find_map(|key| self.0.get(*key).filter(|v| !v.is_null()))
    }

    /// A required positive integer id, given as a number or a digit string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` naming the first key when absent or
    /// malformed.
    pub fn id<T: From<u64>>(&self, keys: &[&str]) -> Result<T, AppError> {
        let name = keys.first().copied().unwrap_or("id");
        let value = self
            .get(keys)
            .ok_or_else(|| AppError::BadRequest(format!("{name} is required")))?;
        let id = match value {
            Value::Number(n) => n.as_u64().filter(|n| *n > 0),
            Value::String(s) => parse_numeric_id(s).ok(),
            _ => None,
        };
        id.map(T::from)
            .ok_or_else(|| AppError::BadRequest(format!("{name} must be a positive integer")))
    }

    /// An optional non-blank string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when present but not a string.
    pub fn opt_str(&self, keys: &[&str]) -> Result<Option<&'a str>, AppError> {
        match self.get(keys) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim()).filter(|s| !s.is_empty())),
            Some(_) => Err(AppError::BadRequest(format!(
                "{} must be a string",
                keys.first().copied().unwrap_or("field")
            ))),
        }
    }

    /// A required non-blank string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when absent, blank or not a string.
    pub fn str(&self, keys: &[&str]) -> Result<&'a str, AppError> {
        self.opt_str(keys)?.ok_or_else(|| {
            AppError::BadRequest(format!(
                "{} is required",
                keys.first().copied().unwrap_or("field")
            ))
        })
    }
}

/// Require a non-empty JSON object body and return it unchanged.
///
/// # Errors
///
/// Returns `AppError::BadRequest` otherwise.
pub fn non_empty_object(body: Value) -> Result<Value, AppError> {
    match &body {
        Value::Object(map) if !map.is_empty() => Ok(body),
        Value::Object(_) => Err(AppError::BadRequest("Request body is empty".to_string())),
        _ => Err(AppError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use patient_portal_core::SubscriptionId;

    use super::*;

    #[test]
    fn test_id_accepts_numbers_and_digit_strings() {
        let body = json!({"subscription_id": 12, "subscriptionId": "13"});
        let fields = Fields::of(&body).unwrap();
        let id: SubscriptionId = fields.id(&["subscription_id"]).unwrap();
        assert_eq!(id.as_u64(), 12);
        let id: SubscriptionId = fields.id(&["missing", "subscriptionId"]).unwrap();
        assert_eq!(id.as_u64(), 13);
    }

    #[test]
    fn test_id_errors_name_the_field() {
        let body = json!({"line_item_id": "abc", "zero": 0});
        let fields = Fields::of(&body).unwrap();
        let err = fields.id::<u64>(&["line_item_id"]).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: line_item_id must be a positive integer");
        let err = fields.id::<u64>(&["subscription_id"]).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: subscription_id is required");
        assert!(fields.id::<u64>(&["zero"]).is_err());
    }

    #[test]
    fn test_strings() {
        let body = json!({"a": " x ", "b": "  ", "c": 1});
        let fields = Fields::of(&body).unwrap();
        assert_eq!(fields.str(&["a"]).unwrap(), "x");
        assert!(fields.str(&["b"]).is_err());
        assert!(fields.opt_str(&["c"]).is_err());
        assert_eq!(fields.opt_str(&["d"]).unwrap(), None);
    }

    #[test]
    fn test_positive_param() {
        assert_eq!(positive_param(None, "page", None).unwrap(), None);
        assert_eq!(positive_param(Some("3"), "page", None).unwrap().unwrap().get(), 3);
        assert!(positive_param(Some("0"), "page", None).is_err());
        assert!(positive_param(Some("-1"), "page", None).is_err());
        assert!(positive_param(Some("101"), "per_page", Some(100)).is_err());
    }

    #[test]
    fn test_ensure_same_user() {
        assert!(ensure_same_user("42", UserId::new(42)).is_ok());
        assert!(matches!(
            ensure_same_user("41", UserId::new(42)),
            Err(AppError::Forbidden(_))
        ));
        assert!(ensure_same_user("abc", UserId::new(42)).is_err());
    }

    #[test]
    fn test_path_id() {
        let id: SubscriptionId = path_id("7", "subscription id").unwrap();
        assert_eq!(id.as_u64(), 7);
        assert!(path_id::<SubscriptionId>("7a", "subscription id").is_err());
    }

    #[test]
    fn test_success_envelope() {
        let Json(body) = success("orders", json!([1]));
        assert_eq!(body, json!({"success": true, "orders": [1]}));
    }
}
