//! Subscription routes.

use axum::{
    Json,
    extract::{Path, State},
};
use patient_portal_core::{LineItemId, Quantity, RefillDate, SubscriptionId};
use serde_json::Value;
use tracing::instrument;

use super::extract::{ApiJson, Fields, path_id, success};
use crate::crm::SubscriptionAction;
use crate::error::{AppError, Result};
use crate::middleware::RequireToken;
use crate::state::AppState;

const SUBSCRIPTION_ID_KEYS: &[&str] = &["subscription_id", "subscriptionId"];

/// `GET /api/user/subscriptions`
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
) -> Result<Json<Value>> {
    let subscriptions = state.crm().subscriptions(&auth.token).await?;
    Ok(success("subscriptions", subscriptions))
}

/// `GET /api/user/subscription/{id}`
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id: SubscriptionId = path_id(&id, "subscription id")?;
    let data = state.crm().subscription(&auth.token, id).await?;
    Ok(success("data", data))
}

/// `PUT /api/user/subscription/update/quantity/{id}`
#[instrument(skip(state, auth, body))]
pub async fn update_quantity(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let id: SubscriptionId = path_id(&id, "subscription id")?;
    let fields = Fields::of(&body)?;
    let line_item_id: LineItemId = fields.id(&["line_item_id", "lineItemId"])?;
    let quantity = Quantity::from_json(fields.get(&["quantity"]))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let data = state
        .crm()
        .update_quantity(&auth.token, id, line_item_id, quantity)
        .await?;
    tracing::info!(subscription_id = %id, quantity = quantity.get(), "Subscription quantity updated");
    Ok(success("data", data))
}

/// `POST /api/user/pause-cancel-subscription`
#[instrument(skip(state, auth, body))]
pub async fn pause_or_cancel(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let fields = Fields::of(&body)?;
    let id: SubscriptionId = fields.id(SUBSCRIPTION_ID_KEYS)?;
    let action = match fields.opt_str(&["action"])? {
        Some(raw) => raw.parse::<SubscriptionAction>().map_err(AppError::BadRequest)?,
        None => SubscriptionAction::default(),
    };
    let reason = fields.opt_str(&["reason"])?;

    let data = state
        .crm()
        .pause_or_cancel(&auth.token, id, action, reason)
        .await?;
    tracing::info!(subscription_id = %id, %action, "Subscription status changed");
    Ok(success("data", data))
}

/// `POST /api/user/change-refill-date`
#[instrument(skip(state, auth, body))]
pub async fn change_refill_date(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let fields = Fields::of(&body)?;
    let id: SubscriptionId = fields.id(SUBSCRIPTION_ID_KEYS)?;
    let refill_date = RefillDate::parse(fields.str(&["refill_date", "refillDate"])?)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let data = state
        .crm()
        .change_refill_date(&auth.token, id, refill_date)
        .await?;
    Ok(success("data", data))
}

/// `POST /api/user/refill-subscription-renewal`
#[instrument(skip(state, auth, body))]
pub async fn refill_renewal(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let fields = Fields::of(&body)?;
    let id: SubscriptionId = fields.id(SUBSCRIPTION_ID_KEYS)?;

    let data = state.crm().refill_renewal(&auth.token, id).await?;
    Ok(success("data", data))
}
