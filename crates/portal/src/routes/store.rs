//! Cart, checkout and product variation routes backed by WooCommerce.
//!
//! None of these need a portal session. The Store API nonce travels in the
//! `cart-nonce` cookie and is refreshed from every Store API response.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use patient_portal_core::{CartItem, ProductId};
use serde_json::{Value, json};
use tracing::instrument;

use super::extract::{ApiJson, path_id};
use crate::error::{AppError, Result};
use crate::middleware::{Session, SetCookies};
use crate::services::StoreResponse;
use crate::state::AppState;

/// `GET /api/cart`
#[instrument(skip(state, session))]
pub async fn cart(State(state): State<AppState>, Session(session): Session) -> Result<Response> {
    let response = state
        .woocommerce()
        .cart(session.cart_nonce.as_deref())
        .await?;
    Ok(store_response(&state, response))
}

/// `POST /api/cart/add-item`
#[instrument(skip(state, session, item))]
pub async fn add_item(
    State(state): State<AppState>,
    Session(session): Session,
    ApiJson(item): ApiJson<CartItem>,
) -> Result<Response> {
    let response = state
        .woocommerce()
        .add_to_cart(&item, session.cart_nonce.as_deref())
        .await?;
    tracing::info!(product_id = %item.product_id, quantity = item.quantity.get(), "Item added to cart");
    Ok(store_response(&state, response))
}

/// `GET /api/cart/checkout-url?items=`
///
/// `items` is a JSON cart item, or an array of them of which the first is
/// used.
#[instrument(skip(state, query))]
pub async fn checkout_url(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let item = first_item(query.get("items").map(String::as_str))?;
    let url = state.woocommerce().checkout_url(&item)?;
    Ok(Json(json!({ "success": true, "url": url })))
}

/// `GET /api/products/{productId}/variations`
///
/// The store's variations are returned exactly as received.
#[instrument(skip(state))]
pub async fn variations(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Value>> {
    let product_id: ProductId = path_id(&product_id, "product id")?;
    Ok(Json(state.woocommerce().variations(product_id).await?))
}

fn store_response(state: &AppState, response: StoreResponse) -> Response {
    let cookies = response
        .nonce
        .as_deref()
        .map(|nonce| SetCookies::cart_nonce(nonce, state.secure_cookies()))
        .unwrap_or_default();
    (
        cookies,
        Json(json!({ "success": true, "cart": response.body })),
    )
        .into_response()
}

fn first_item(raw: Option<&str>) -> Result<CartItem> {
    let raw = raw
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::BadRequest("items is required".to_string()))?;
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::BadRequest(format!("items must be JSON: {e}")))?;
    let value = match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| AppError::BadRequest("items is empty".to_string()))?,
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| AppError::BadRequest(format!("Invalid cart item: {e}")))
}
