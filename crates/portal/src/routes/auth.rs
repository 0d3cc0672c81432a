//! Login, logout and auto-login.
//!
//! The session is a set of plain cookies (see [`SetCookies`]); these handlers
//! are the only ones that write or clear them.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use patient_portal_core::{Email, UserId};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::extract::{ApiJson, Fields};
use crate::crm::scalar_field;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{LoginSession, Session, SetCookies};
use crate::state::AppState;
use crate::upstream::UpstreamError;

/// Where auto-login lands when no `redirect` is given.
pub const DEFAULT_REDIRECT: &str = "/dashboard";

/// Where auto-login sends the browser when the token does not verify.
pub const AUTO_LOGIN_FAILED: &str = "/login?error=auto_login_failed";

/// `POST /api/auth/login`
#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Response> {
    let fields = Fields::of(&body)?;
    let email = fields
        .opt_str(&["email"])?
        .and_then(|raw| Email::parse(raw).ok())
        .ok_or_else(|| AppError::BadRequest("A valid email is required".to_string()))?;
    let password = fields
        .get(&["password"])
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("password is required".to_string()))?;

    let result = state.crm().login(&email, password).await?;
    let user_id = result.user_id().ok_or_else(|| {
        AppError::Upstream(UpstreamError::decode("crm", "login response carried no user id"))
    })?;

    let session = LoginSession {
        user_id,
        wp_user_id: result.wp_user_id(),
        email: result.email().or_else(|| Some(email.to_string())),
        token: result.token.clone(),
    };
    set_sentry_user(&session.user_id, session.email.as_deref());
    tracing::info!(user_id = %session.user_id, "Patient logged in");

    let cookies = SetCookies::session(&session, state.secure_cookies());
    Ok((
        cookies,
        Json(json!({
            "success": true,
            "token": result.token,
            "user": result.user,
        })),
    )
        .into_response())
}

/// `POST /api/auth/logout`
///
/// Always clears the session cookies; the upstream logout is best-effort.
#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, Session(session): Session) -> Response {
    if let Some(token) = session.auth_token.as_deref()
        && let Err(e) = state.crm().logout(token).await
    {
        tracing::warn!(error = %e, "CRM logout failed; clearing local session anyway");
    }
    clear_sentry_user();

    (
        SetCookies::cleared(state.secure_cookies()),
        Json(json!({ "success": true })),
    )
        .into_response()
}

/// Query parameters for auto-login.
#[derive(Debug, Deserialize)]
pub struct AutoLoginQuery {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub redirect: Option<String>,
}

/// `GET /api/auth/auto-login?token=&user_id=&redirect=`
///
/// Verifies a token handed over by an external site and turns it into a
/// local session.
#[instrument(skip(state, query))]
pub async fn auto_login(
    State(state): State<AppState>,
    Query(query): Query<AutoLoginQuery>,
) -> Result<Response> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("token is required".to_string()))?;
    let user_id = query
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?
        .parse::<UserId>()
        .map_err(|e| AppError::BadRequest(format!("Invalid user_id: {e}")))?;
    let target = safe_redirect(query.redirect.as_deref());

    let user = match state.crm().profile(token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, "Auto-login verification failed");
            return Ok(Redirect::to(AUTO_LOGIN_FAILED).into_response());
        }
    };

    // The token decides who logs in; user_id must name the same patient
    let verified = scalar_field(&user, &["id", "user_id", "crm_user_id"])
        .and_then(|id| id.parse::<UserId>().ok());
    if verified != Some(user_id) {
        tracing::warn!(
            user_id = %user_id,
            verified_user_id = ?verified.map(|id| id.to_string()),
            "Auto-login user_id does not match the token's profile"
        );
        return Ok(Redirect::to(AUTO_LOGIN_FAILED).into_response());
    }

    let session = LoginSession {
        user_id: user_id.to_string(),
        wp_user_id: scalar_field(&user, &["wp_user_id", "wordpress_user_id"]),
        email: scalar_field(&user, &["email"]),
        token: token.to_string(),
    };
    set_sentry_user(&session.user_id, session.email.as_deref());
    tracing::info!(user_id = %session.user_id, "Patient auto-logged in");

    Ok((
        SetCookies::session(&session, state.secure_cookies()),
        Redirect::to(target),
    )
        .into_response())
}

/// Accept only same-origin relative paths.
#[must_use]
pub fn safe_redirect(raw: Option<&str>) -> &str {
    match raw.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path
        }
        _ => DEFAULT_REDIRECT,
    }
}
