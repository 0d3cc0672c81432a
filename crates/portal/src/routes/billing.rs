//! Address book and payment profile routes.

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::instrument;

use super::extract::{ApiJson, non_empty_object, success};
use super::records::own_user_id;
use crate::crm::{AddressKind, AddressUpdate, BillingOutcome};
use crate::error::{AppError, Result};
use crate::middleware::RequireToken;
use crate::state::AppState;

/// `PATCH /api/user/billing/address/update`
///
/// With `same_as_shipping` the shipping address is updated afterwards. When
/// only the second call fails the response is a 422 carrying the shipping
/// error message, with the saved billing address in `details`.
#[instrument(skip(state, auth, body))]
pub async fn update_billing_address(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let address = AddressUpdate::from_json(body).map_err(AppError::BadRequest)?;

    match state
        .crm()
        .update_billing_address(&auth.token, &address)
        .await?
    {
        BillingOutcome::Updated(billing) => Ok(success("data", billing)),
        BillingOutcome::BothUpdated { billing, shipping } => Ok(success(
            "data",
            json!({ "billing": billing, "shipping": shipping }),
        )),
        BillingOutcome::ShippingFailed { billing, error } => Err(AppError::PartialUpdate {
            completed: AddressKind::Billing.label(),
            failed: AddressKind::Shipping.label(),
            data: billing,
            source: error,
        }),
    }
}

/// `PATCH /api/user/shipping/address/update`
#[instrument(skip(state, auth, body))]
pub async fn update_shipping_address(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let address = AddressUpdate::from_json(body).map_err(AppError::BadRequest)?;
    let data = state
        .crm()
        .update_address(&auth.token, AddressKind::Shipping, &address)
        .await?;
    Ok(success("data", data))
}

/// `PATCH /api/user/payment/profiles/update`
#[instrument(skip(state, auth, body))]
pub async fn update_payment_profiles(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let body = non_empty_object(body)?;
    let data = state
        .crm()
        .update_payment_profiles(&auth.token, body)
        .await?;
    Ok(success("data", data))
}

/// `GET /api/user/{userId}/payment/profiles`
#[instrument(skip(state, auth))]
pub async fn payment_profiles(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let user_id = own_user_id(auth.cookies.user_id.as_deref(), &user_id)?;
    let data = state.crm().payment_profiles(&auth.token, user_id).await?;
    Ok(success("data", data))
}
