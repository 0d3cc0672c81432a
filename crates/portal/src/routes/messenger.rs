//! Messenger routes. All of them act on behalf of the `userId` cookie.

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use patient_portal_core::SubscriptionId;
use serde_json::{Value, json};
use tracing::instrument;

use super::extract::{Fields, path_id};
use crate::error::{AppError, Result};
use crate::middleware::RequireUserId;
use crate::state::AppState;

/// `POST /api/messenger/session {thread_id?}`
///
/// The body may be empty.
#[instrument(skip(state, session, body))]
pub async fn session(
    State(state): State<AppState>,
    session: RequireUserId,
    body: Bytes,
) -> Result<Json<Value>> {
    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
    };
    let thread_id = match &body {
        Value::Null => None,
        other => Fields::of(other)?.opt_str(&["thread_id", "threadId"])?,
    };

    let chat = state
        .messenger()
        .open_chat(&session.user_id, thread_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "chatUrl": chat.chat_url,
        "loginURL": chat.login_url,
        "authToken": chat.auth_token,
    })))
}

/// `GET /api/messenger/unread-count`
#[instrument(skip(state, session))]
pub async fn unread_count(
    State(state): State<AppState>,
    session: RequireUserId,
) -> Result<Json<Value>> {
    let count = state.messenger().unread_count(&session.user_id).await?;
    Ok(Json(json!({ "success": true, "count": count })))
}

/// `GET /api/messenger/subscription-thread?subscriptionId=`
#[instrument(skip(state, session, query))]
pub async fn subscription_thread(
    State(state): State<AppState>,
    session: RequireUserId,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let raw = query
        .get("subscriptionId")
        .or_else(|| query.get("subscription_id"))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("subscriptionId is required".to_string()))?;
    let subscription_id: SubscriptionId = path_id(raw, "subscriptionId")?;

    let chat = state
        .messenger()
        .subscription_thread(&session.user_id, &subscription_id.to_string())
        .await?;
    Ok(Json(json!({
        "success": true,
        "chatId": chat.chat_id,
        "chatUrl": chat.chat_url,
    })))
}

/// `GET /api/messenger/threads/search-by-participants?participantIds=a,b`
#[instrument(skip(state, session, query))]
pub async fn search_by_participants(
    State(state): State<AppState>,
    session: RequireUserId,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let participants = participant_ids(query.get("participantIds").map(String::as_str))?;

    let (_, search) = state
        .messenger()
        .search_threads(&session.user_id, &participants)
        .await?;
    Ok(Json(json!({
        "success": true,
        "chatId": search.chat_id,
        "threads": search.threads,
    })))
}

fn participant_ids(raw: Option<&str>) -> Result<Vec<String>> {
    let ids: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    if ids.is_empty() {
        return Err(AppError::BadRequest("participantIds is required".to_string()));
    }
    Ok(ids)
}
