//! Subscription reads and changes.

use std::fmt;
use std::str::FromStr;

use patient_portal_core::{LineItemId, Quantity, RefillDate, SubscriptionId};
use reqwest::Method;
use serde_json::{Value, json};

use super::{CrmBody, CrmClient};
use crate::upstream::ProxyError;

/// What to do with a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionAction {
    #[default]
    Pause,
    Cancel,
}

impl SubscriptionAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for SubscriptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "cancel" => Ok(Self::Cancel),
            other => Err(format!("action must be 'pause' or 'cancel' (got '{other}')")),
        }
    }
}

impl CrmClient {
    /// List the patient's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn subscriptions(&self, token: &str) -> Result<Value, ProxyError> {
        let payload = self
            .call(Method::GET, "/api/subscriptions/list", token, CrmBody::Empty)
            .await?;
        Ok(payload.list("subscriptions"))
    }

    /// Fetch one subscription.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn subscription(&self, token: &str, id: SubscriptionId) -> Result<Value, ProxyError> {
        let payload = self
            .call(
                Method::GET,
                &format!("/api/subscriptions/{id}"),
                token,
                CrmBody::Empty,
            )
            .await?;
        Ok(payload.data)
    }

    /// Change the quantity of one line item.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn update_quantity(
        &self,
        token: &str,
        id: SubscriptionId,
        line_item_id: LineItemId,
        quantity: Quantity,
    ) -> Result<Value, ProxyError> {
        let payload = self
            .call(
                Method::PUT,
                &format!("/api/subscriptions/{id}/quantity"),
                token,
                CrmBody::Json(json!({
                    "line_item_id": line_item_id,
                    "quantity": quantity,
                })),
            )
            .await?;
        Ok(payload.data)
    }

    /// Pause or cancel a subscription.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn pause_or_cancel(
        &self,
        token: &str,
        id: SubscriptionId,
        action: SubscriptionAction,
        reason: Option<&str>,
    ) -> Result<Value, ProxyError> {
        let body = reason.map_or(CrmBody::Empty, |reason| {
            CrmBody::Json(json!({ "reason": reason }))
        });
        let payload = self
            .call(
                Method::POST,
                &format!("/api/subscriptions/{id}/{action}"),
                token,
                body,
            )
            .await?;
        Ok(payload.data)
    }

    /// Move the next refill to another date.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn change_refill_date(
        &self,
        token: &str,
        id: SubscriptionId,
        refill_date: RefillDate,
    ) -> Result<Value, ProxyError> {
        let payload = self
            .call(
                Method::POST,
                "/api/subscriptions/change-refill-date",
                token,
                CrmBody::Json(json!({
                    "subscription_id": id,
                    "refill_date": refill_date,
                })),
            )
            .await?;
        Ok(payload.data)
    }

    /// Trigger an early renewal.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn refill_renewal(&self, token: &str, id: SubscriptionId) -> Result<Value, ProxyError> {
        let payload = self
            .call(
                Method::POST,
                "/api/subscriptions/refill-renewal",
                token,
                CrmBody::Json(json!({ "subscription_id": id })),
            )
            .await?;
        Ok(payload.data)
    }
}
