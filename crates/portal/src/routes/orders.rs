//! Order history and invoice downloads.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use patient_portal_core::OrderId;
use serde_json::{Value, json};
use tracing::instrument;

use super::extract::{path_id, positive_param, success};
use crate::error::Result;
use crate::middleware::RequireToken;
use crate::state::AppState;

/// `GET /api/orders`
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
) -> Result<Json<Value>> {
    let page = state.crm().orders(&auth.token, None).await?;
    Ok(success("orders", page.orders))
}

/// `GET /api/user/orders?page=N`
#[instrument(skip(state, auth, query))]
pub async fn paged(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let page = positive_param(query.get("page").map(String::as_str), "page", None)?;
    let result = state.crm().orders(&auth.token, page).await?;

    let mut body = json!({ "success": true, "orders": result.orders });
    if let Some(pagination) = result.pagination {
        body["pagination"] = pagination;
    }
    Ok(Json(body))
}

/// `GET /api/user/order/invoice/download/{orderId}`
///
/// Streams the CRM's PDF back with its content headers.
#[instrument(skip(state, auth))]
pub async fn invoice(
    State(state): State<AppState>,
    RequireToken(auth): RequireToken,
    Path(order_id): Path<String>,
) -> Result<Response> {
    let order_id: OrderId = path_id(&order_id, "order id")?;
    let invoice = state.crm().invoice(&auth.token, order_id).await?;

    let mut headers = HeaderMap::new();
    for (name, value) in invoice.passthrough_headers() {
        headers.insert(name, value);
    }
    tracing::debug!(%order_id, "Streaming invoice");

    Ok((StatusCode::OK, headers, invoice.into_body()).into_response())
}
