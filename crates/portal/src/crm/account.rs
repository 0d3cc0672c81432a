//! Patient account operations: login, logout and the profile.

use bytes::Bytes;
use patient_portal_core::{Email, ProfileField};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use tracing::instrument;

use super::{CrmBody, CrmClient};
use crate::upstream::{ProxyError, UpstreamError};

/// Outcome of a successful CRM login.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub user: Value,
}

impl LoginResult {
    /// CRM user id of the logged-in patient.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        scalar_field(&self.user, &["id", "user_id", "crm_user_id"])
    }

    /// WordPress user id of the logged-in patient.
    #[must_use]
    pub fn wp_user_id(&self) -> Option<String> {
        scalar_field(&self.user, &["wp_user_id", "wordpress_user_id", "wp_id"])
    }

    /// Email on the CRM record.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        scalar_field(&self.user, &["email"])
    }
}

/// One validated part of a multipart profile update.
#[derive(Debug, Clone)]
pub enum UploadPart {
    Text(String),
    File {
        file_name: Option<String>,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

/// A multipart profile update restricted to the allowed fields.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpload {
    parts: Vec<(ProfileField, UploadPart)>,
}

impl ProfileUpload {
    pub fn push(&mut self, field: ProfileField, part: UploadPart) {
        self.parts.push((field, part));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Re-encode as the multipart form the CRM expects, keeping file names
    /// and content types.
    ///
    /// # Errors
    ///
    /// Returns the field name when a part carries an unparseable content type.
    pub fn into_form(self) -> Result<Form, String> {
        let mut form = Form::new();
        for (field, part) in self.parts {
            let name = field.as_str();
            form = match part {
                UploadPart::Text(text) => form.text(name, text),
                UploadPart::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let part = file_part(bytes, file_name, content_type.as_deref())
                        .map_err(|_| name.to_string())?;
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

/// Build a multipart file part, preserving name and content type.
pub(crate) fn file_part(
    bytes: Bytes,
    file_name: Option<String>,
    content_type: Option<&str>,
) -> Result<Part, reqwest::Error> {
    let mut part = Part::bytes(bytes.to_vec());
    if let Some(file_name) = file_name {
        part = part.file_name(file_name);
    }
    match content_type {
        Some(content_type) => part.mime_str(content_type),
        None => Ok(part),
    }
}

impl CrmClient {
    /// Exchange patient credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on upstream failure, or a decode error when the
    /// response carries no token.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &str) -> Result<LoginResult, ProxyError> {
        let payload = self
            .call_unauthenticated(
                Method::POST,
                "/api/patient/login",
                CrmBody::Json(json!({"email": email.as_str(), "password": password})),
            )
            .await?;

        let token = payload
            .token()
            .ok_or_else(|| UpstreamError::decode("crm", "login response carried no token"))?;
        Ok(LoginResult {
            token,
            user: payload.user(),
        })
    }

    /// Invalidate the token upstream.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on any failure; callers treat it as best-effort.
    pub async fn logout(&self, token: &str) -> Result<(), ProxyError> {
        self.call(Method::POST, "/api/patient/logout", token, CrmBody::Empty)
            .await
            .map(drop)
    }

    /// Fetch the patient's profile, normalized to the user record.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn profile(&self, token: &str) -> Result<Value, ProxyError> {
        let payload = self
            .call(Method::GET, "/api/user/profile", token, CrmBody::Empty)
            .await?;
        Ok(payload.user())
    }

    /// Update profile fields from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn update_profile(&self, token: &str, fields: Value) -> Result<Value, ProxyError> {
        let payload = self
            .call(
                Method::POST,
                "/api/user/profile/update",
                token,
                CrmBody::Json(fields),
            )
            .await?;
        Ok(payload.user())
    }

    /// Upload profile files and fields as multipart.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn upload_profile(&self, token: &str, form: Form) -> Result<Value, ProxyError> {
        let payload = self
            .call(
                Method::POST,
                "/api/user/profile/upload",
                token,
                CrmBody::Multipart(form),
            )
            .await?;
        Ok(payload.user())
    }
}

/// The first non-empty string or number among `keys`, as a string.
#[must_use]
pub fn scalar_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
