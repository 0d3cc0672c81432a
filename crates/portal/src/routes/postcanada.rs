//! Canada Post address autocomplete.

use axum::{Json, extract::State};
use serde_json::Value;
use tracing::instrument;

use super::extract::{ApiJson, Fields, success};
use crate::error::{AppError, Result};
use crate::services::AddressQuery;
use crate::state::AppState;

/// `POST /api/postcanada/address-details {addressId, searchTerm}`
#[instrument(skip(state, body))]
pub async fn address_details(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>> {
    let fields = Fields::of(&body)?;
    let query = AddressQuery::from_inputs(
        fields.opt_str(&["addressId", "address_id"])?,
        fields.opt_str(&["searchTerm", "search_term"])?,
    )
    .ok_or_else(|| AppError::BadRequest("addressId or searchTerm is required".to_string()))?;

    let items = state.postcanada().lookup(&query).await?;
    Ok(success("data", items))
}
