//! Orders and invoice downloads.

use std::num::NonZeroU32;

use patient_portal_core::OrderId;
use reqwest::Method;
use reqwest::header::{
    ACCEPT, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use serde_json::Value;

use super::{CrmBody, CrmClient};
use crate::upstream::ProxyError;

/// One page of the patient's orders.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Value,
    pub pagination: Option<Value>,
}

/// An invoice download, not yet read.
#[derive(Debug)]
pub struct Invoice {
    response: reqwest::Response,
}

impl Invoice {
    /// Headers that must reach the browser unchanged.
    pub const PASSTHROUGH_HEADERS: [HeaderName; 3] =
        [CONTENT_TYPE, CONTENT_DISPOSITION, CONTENT_LENGTH];

    /// Upstream values of [`Invoice::PASSTHROUGH_HEADERS`] that were present.
    pub fn passthrough_headers(
        &self,
    ) -> impl Iterator<Item = (HeaderName, HeaderValue)> + '_ {
        Self::PASSTHROUGH_HEADERS.into_iter().filter_map(|name| {
            self.response
                .headers()
                .get(&name)
                .cloned()
                .map(|value| (name, value))
        })
    }

    /// The body as a streamed response body, untouched.
    #[must_use]
    pub fn into_body(self) -> axum::body::Body {
        axum::body::Body::from_stream(self.response.bytes_stream())
    }
}

impl CrmClient {
    /// List orders, optionally at a given page.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn orders(
        &self,
        token: &str,
        page: Option<NonZeroU32>,
    ) -> Result<OrderPage, ProxyError> {
        let path = match page {
            Some(page) => format!("/api/crm-orders/list?page={page}"),
            None => "/api/crm-orders/list".to_string(),
        };
        let payload = self.call(Method::GET, &path, token, CrmBody::Empty).await?;

        Ok(OrderPage {
            orders: payload.list("orders"),
            pagination: payload.pagination("orders"),
        })
    }

    /// Start downloading an order invoice.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on failure.
    pub async fn invoice(&self, token: &str, order_id: OrderId) -> Result<Invoice, ProxyError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/pdf"));
        let response = self
            .call_raw(
                Method::GET,
                &format!("/api/crm-orders/{order_id}/invoice"),
                token,
                headers,
            )
            .await?;
        Ok(Invoice { response })
    }
}
