//! Patient profile read and update.

use axum::{
    Json,
    extract::{FromRequest, Multipart, Request, State, multipart::Field},
    http::header,
};
use patient_portal_core::ProfileField;
use serde_json::{Value, json};
use tracing::instrument;

use super::extract::{ApiJson, multipart_error, non_empty_object};
use crate::crm::{ProfileUpload, UploadPart};
use crate::error::{AppError, Result};
use crate::middleware::RequireToken;
use crate::state::AppState;

/// `GET /api/user/profile`
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
) -> Result<Json<Value>> {
    let user = state.crm().profile(&auth.token).await?;
    Ok(Json(json!({ "status": true, "user": user })))
}

/// `POST /api/user/profile`
///
/// A multipart body goes to the CRM upload endpoint restricted to the upload
/// fields; anything else is treated as a JSON field update.
#[instrument(skip(state, auth, request))]
pub async fn update(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    request: Request,
) -> Result<Json<Value>> {
    let user = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?;
        let upload = read_upload(multipart).await?;
        let form = upload
            .into_form()
            .map_err(|field| AppError::BadRequest(format!("Invalid content type for {field}")))?;
        state.crm().upload_profile(&auth.token, form).await?
    } else {
        let ApiJson(body) = ApiJson::<Value>::from_request(request, &state).await?;
        let fields = non_empty_object(body)?;
        state.crm().update_profile(&auth.token, fields).await?
    };

    Ok(Json(json!({ "status": true, "user": user })))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

async fn read_upload(mut multipart: Multipart) -> Result<ProfileUpload> {
    let mut upload = ProfileUpload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let profile_field = name
            .parse::<ProfileField>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let part = read_part(profile_field, field).await?;
        upload.push(profile_field, part);
    }

    if upload.is_empty() {
        return Err(AppError::BadRequest("No profile fields to update".to_string()));
    }
    Ok(upload)
}

async fn read_part(profile_field: ProfileField, field: Field<'_>) -> Result<UploadPart> {
    let unreadable = |e: axum::extract::multipart::MultipartError| match multipart_error(&e) {
        AppError::BadRequest(_) => {
            AppError::BadRequest(format!("Could not read {profile_field}: {}", e.body_text()))
        }
        too_large => too_large,
    };

    if profile_field.is_file() {
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(unreadable)?;
        Ok(UploadPart::File {
            file_name,
            content_type,
            bytes,
        })
    } else {
        Ok(UploadPart::Text(field.text().await.map_err(unreadable)?))
    }
}
