//! Prescriptions, documents, medical profile, consultations and appointments.

use std::collections::HashMap;
use std::num::NonZeroU32;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use patient_portal_core::{CrmUserId, Email, PrescriptionId, UserId};
use reqwest::multipart::Form;
use serde_json::Value;
use tracing::instrument;

use super::extract::{
    ApiJson, ensure_same_user, multipart_error, non_empty_object, path_id, positive_param,
    success,
};
use crate::crm::file_part;
use crate::error::{AppError, Result};
use crate::middleware::RequireToken;
use crate::state::AppState;

/// Page size when `per_page` is not given.
pub const DEFAULT_PER_PAGE: NonZeroU32 = NonZeroU32::MIN.saturating_add(9);

/// Largest accepted `per_page`.
pub const MAX_PER_PAGE: u32 = 100;

/// `GET /api/user/prescriptions?crm_user_id=&per_page=`
///
/// `crm_user_id` defaults to the `userId` cookie.
#[instrument(skip(state, auth, query))]
pub async fn prescriptions(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let raw_user = query
        .get("crm_user_id")
        .map(String::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or(auth.cookies.user_id.as_deref())
        .ok_or_else(|| AppError::BadRequest("crm_user_id is required".to_string()))?;
    let crm_user_id: CrmUserId = path_id(raw_user, "crm_user_id")?;
    let per_page = positive_param(
        query.get("per_page").map(String::as_str),
        "per_page",
        Some(MAX_PER_PAGE),
    )?
    .unwrap_or(DEFAULT_PER_PAGE);

    let data = state
        .crm()
        .prescriptions(&auth.token, crm_user_id, per_page)
        .await?;
    Ok(success("data", data))
}

/// `GET /api/user/prescription/{id}`
#[instrument(skip(state, auth))]
pub async fn prescription(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id: PrescriptionId = path_id(&id, "prescription id")?;
    let data = state.crm().prescription(&auth.token, id).await?;
    Ok(success("data", data))
}

/// `GET /api/user/{userId}/documents`
#[instrument(skip(state, auth))]
pub async fn documents(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let user_id = own_user_id(auth.cookies.user_id.as_deref(), &user_id)?;
    let data = state.crm().documents(&auth.token, user_id).await?;
    Ok(success("data", data))
}

/// `POST /api/user/{userId}/documents` (multipart with a `file` part)
#[instrument(skip(state, auth, multipart))]
pub async fn upload_document(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Path(user_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let user_id = own_user_id(auth.cookies.user_id.as_deref(), &user_id)?;
    let invalid = |e: axum::extract::multipart::MultipartError| multipart_error(&e);

    let mut form = Form::new();
    let mut has_file = false;
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() || name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(invalid)?;
            let part = file_part(bytes, file_name, content_type.as_deref())
                .map_err(|_| AppError::BadRequest(format!("Invalid content type for {name}")))?;
            has_file |= name == "file";
            form = form.part(name, part);
        } else {
            let text = field.text().await.map_err(invalid)?;
            form = form.text(name, text);
        }
    }
    if !has_file {
        return Err(AppError::BadRequest("A file is required".to_string()));
    }

    let data = state
        .crm()
        .upload_document(&auth.token, user_id, form)
        .await?;
    tracing::info!(%user_id, "Document uploaded");
    Ok(success("data", data))
}

/// `GET /api/user/medical-profile`
#[instrument(skip(state, auth))]
pub async fn medical_profile(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
) -> Result<Json<Value>> {
    let data = state.crm().medical_profile(&auth.token).await?;
    Ok(success("data", data))
}

/// `POST /api/user/medical-profile`
#[instrument(skip(state, auth, body))]
pub async fn update_medical_profile(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let answers = non_empty_object(body)?;
    let data = state
        .crm()
        .update_medical_profile(&auth.token, answers)
        .await?;
    Ok(success("data", data))
}

/// `GET /api/user/consultations`
#[instrument(skip(state, auth))]
pub async fn consultations(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
) -> Result<Json<Value>> {
    let data = state.crm().consultations(&auth.token).await?;
    Ok(success("data", data))
}

/// `GET /api/user/appointments`
///
/// Looks meetings up by the `userEmail` cookie.
#[instrument(skip(state, auth))]
pub async fn appointments(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
) -> Result<Json<Value>> {
    let email = auth
        .cookies
        .user_email
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("User email not available".to_string()))?;
    let email = Email::parse(email)
        .map_err(|e| AppError::BadRequest(format!("Invalid userEmail cookie: {e}")))?;

    let meetings = state.meetings().meetings(&email).await?;
    Ok(success("meetings", meetings))
}

/// Parse a `userId` path segment and require it to be the caller's own.
pub(super) fn own_user_id(cookie_user_id: Option<&str>, raw: &str) -> Result<UserId> {
    let user_id: UserId = path_id(raw, "user id")?;
    let own = cookie_user_id.ok_or_else(|| AppError::Unauthorized("User not logged in".to_string()))?;
    ensure_same_user(own, user_id)?;
    Ok(user_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_per_page() {
        assert_eq!(DEFAULT_PER_PAGE.get(), 10);
    }

    #[test]
    fn test_own_user_id() {
        let own = Some("42");
        assert_eq!(own_user_id(own, "42").unwrap(), UserId::new(42));
        assert!(matches!(own_user_id(own, "43"), Err(AppError::Forbidden(_))));
        assert!(matches!(own_user_id(None, "42"), Err(AppError::Unauthorized(_))));
        assert!(matches!(own_user_id(own, "4x"), Err(AppError::BadRequest(_))));
    }
}
