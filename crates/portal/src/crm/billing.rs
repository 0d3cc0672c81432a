//! Billing and shipping addresses, payment profiles.

use patient_portal_core::UserId;
use reqwest::Method;
use serde_json::{Map, Value};

use super::{CrmBody, CrmClient};
use crate::upstream::{ProxyError, UpstreamError};

/// Which address book entry to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Billing,
    Shipping,
}

impl AddressKind {
    const fn path(self) -> &'static str {
        match self {
            Self::Billing => "/api/user/billing-address",
            Self::Shipping => "/api/user/shipping-address",
        }
    }

    /// Human readable name used in messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Billing => "billing address",
            Self::Shipping => "shipping address",
        }
    }
}

/// An address with every required field present.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressUpdate {
    fields: Map<String, Value>,
    same_as_shipping: bool,
}

impl AddressUpdate {
    /// Fields that must be present and non-blank.
    pub const REQUIRED: [&'static str; 4] = ["address_1", "city", "postcode", "country"];

    /// Validate a JSON request body.
    ///
    /// The `same_as_shipping` flag is taken out of the body; every other field
    /// is forwarded as-is.
    ///
    /// # Errors
    ///
    /// Returns a field-specific message for the first problem found.
    pub fn from_json(body: Value) -> Result<Self, String> {
        let Value::Object(mut fields) = body else {
            return Err("request body must be a JSON object".to_string());
        };

        for field in Self::REQUIRED {
            let present = fields
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(format!("{field} is required"));
            }
        }

        let same_as_shipping = match fields.remove("same_as_shipping") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(Value::String(s)) => matches!(s.trim(), "true" | "1" | "yes"),
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            Some(_) => return Err("same_as_shipping must be a boolean".to_string()),
        };

        Ok(Self {
            fields,
            same_as_shipping,
        })
    }

    /// Whether the billing address should also become the shipping address.
    #[must_use]
    pub const fn same_as_shipping(&self) -> bool {
        self.same_as_shipping
    }

    fn body(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Result of a billing address update.
#[derive(Debug)]
pub enum BillingOutcome {
    /// Billing updated; shipping not requested.
    Updated(Value),
    /// Billing and shipping both updated.
    BothUpdated { billing: Value, shipping: Value },
    /// Billing updated, then the shipping copy failed. Nothing is rolled back.
    ShippingFailed { billing: Value, error: UpstreamError },
}

impl CrmClient {
    /// Update one address.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn update_address(
        &self,
        token: &str,
        kind: AddressKind,
        address: &AddressUpdate,
    ) -> Result<Value, ProxyError> {
        Ok(self
            .call(Method::PATCH, kind.path(), token, CrmBody::Json(address.body()))
            .await?
            .data)
    }

    /// Update the billing address, then the shipping address when the patient
    /// asked for both to match. The two calls are sequential.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` when the billing update fails. A shipping failure
    /// is reported through [`BillingOutcome::ShippingFailed`].
    pub async fn update_billing_address(
        &self,
        token: &str,
        address: &AddressUpdate,
    ) -> Result<BillingOutcome, ProxyError> {
        let billing = self
            .update_address(token, AddressKind::Billing, address)
            .await?;
        if !address.same_as_shipping() {
            return Ok(BillingOutcome::Updated(billing));
        }

        match self
            .update_address(token, AddressKind::Shipping, address)
            .await
        {
            Ok(shipping) => Ok(BillingOutcome::BothUpdated { billing, shipping }),
            Err(ProxyError::Upstream(error)) => {
                tracing::warn!(error = %error, "Billing address updated but shipping update failed");
                Ok(BillingOutcome::ShippingFailed { billing, error })
            }
            Err(other) => Err(other),
        }
    }

    /// Update stored payment profiles.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn update_payment_profiles(
        &self,
        token: &str,
        body: Value,
    ) -> Result<Value, ProxyError> {
        Ok(self
            .call(
                Method::PATCH,
                "/api/user/payment-profiles",
                token,
                CrmBody::Json(body),
            )
            .await?
            .data)
    }

    /// List payment profiles for a user.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn payment_profiles(&self, token: &str, user_id: UserId) -> Result<Value, ProxyError> {
        let path = format!("/api/users/{user_id}/payment-profiles");
        Ok(self.call(Method::GET, &path, token, CrmBody::Empty).await?.data)
    }
}
