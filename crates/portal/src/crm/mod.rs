//! CRM REST API client.
//!
//! Every CRM route in the portal goes through [`CrmClient::call`]: one request
//! to `{CRM_HOST}{path}` with the patient's bearer token and the
//! `is-patient-portal: true` header. Failures are surfaced once, never retried.
//! The resource modules add typed operations on top as `impl CrmClient` blocks.

mod account;
mod billing;
pub mod envelope;
mod orders;
mod records;
mod subscriptions;

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::CrmConfig;
use crate::error::add_breadcrumb;
use crate::upstream::{ProxyError, UpstreamError, log_payload, read_failure};

pub use account::{LoginResult, ProfileUpload, UploadPart, scalar_field};
pub(crate) use account::file_part;
pub use billing::{AddressKind, AddressUpdate, BillingOutcome};
pub use envelope::CrmPayload;
pub use orders::{Invoice, OrderPage};
pub use subscriptions::SubscriptionAction;

const SERVICE: &str = "crm";

/// Header that tells the CRM the call comes from the patient portal.
pub const PORTAL_HEADER: &str = "is-patient-portal";

/// Request body sent to the CRM.
#[derive(Debug, Default)]
pub enum CrmBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(reqwest::multipart::Form),
}

/// Client for the CRM REST API.
#[derive(Clone)]
pub struct CrmClient {
    inner: Arc<CrmClientInner>,
}

struct CrmClientInner {
    client: reqwest::Client,
    config: CrmConfig,
    debug_payloads: bool,
}

impl CrmClient {
    /// Create a new CRM client.
    ///
    /// The host is not required here; it is checked on every call.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &CrmConfig, debug_payloads: bool) -> Self {
        Self {
            inner: Arc::new(CrmClientInner {
                client,
                config: config.clone(),
                debug_payloads,
            }),
        }
    }

    /// Call the CRM on behalf of a patient and unwrap the JSON envelope.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::Unauthenticated`] for a blank token (nothing is sent)
    /// - [`ProxyError::Config`] when `CRM_HOST` is unset (nothing is sent)
    /// - [`ProxyError::Upstream`] for transport failures, error statuses,
    ///   undecodable bodies and envelopes flagged `status: false`
    #[instrument(skip(self, token, body), fields(service = SERVICE))]
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: CrmBody,
    ) -> Result<CrmPayload, ProxyError> {
        let token = bearer(token)?;
        let response = self
            .send(method, path, Some(token), body, HeaderMap::new())
            .await?;
        self.read_json(response).await
    }

    /// Call a CRM endpoint that does not take a bearer token (login).
    ///
    /// # Errors
    ///
    /// Same as [`CrmClient::call`], minus the token check.
    #[instrument(skip(self, body), fields(service = SERVICE))]
    pub async fn call_unauthenticated(
        &self,
        method: Method,
        path: &str,
        body: CrmBody,
    ) -> Result<CrmPayload, ProxyError> {
        let response = self
            .send(method, path, None, body, HeaderMap::new())
            .await?;
        self.read_json(response).await
    }

    /// Call the CRM and hand back the raw successful response (file downloads).
    ///
    /// `extra_headers` replace the defaults of the same name, so a download
    /// can ask for something other than JSON.
    ///
    /// # Errors
    ///
    /// Same as [`CrmClient::call`], except the body is never decoded.
    #[instrument(skip(self, token, extra_headers), fields(service = SERVICE))]
    pub async fn call_raw(
        &self,
        method: Method,
        path: &str,
        token: &str,
        extra_headers: HeaderMap,
    ) -> Result<reqwest::Response, ProxyError> {
        let token = bearer(token)?;
        self.send(method, path, Some(token), CrmBody::Empty, extra_headers)
            .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: CrmBody,
        extra_headers: HeaderMap,
    ) -> Result<reqwest::Response, ProxyError> {
        let host = self.inner.config.require_host()?;
        let url = format!("{host}{path}");
        add_breadcrumb(SERVICE, &format!("{method} {path}"));

        let mut request = self
            .inner
            .client
            .request(method.clone(), &url)
            .header(PORTAL_HEADER, "true")
            .header(reqwest::header::ACCEPT, "application/json")
            .headers(extra_headers);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request = match body {
            CrmBody::Empty => request,
            CrmBody::Json(value) => {
                log_payload(self.inner.debug_payloads, SERVICE, "request", &value.to_string());
                request.json(&value)
            }
            CrmBody::Multipart(form) => request.multipart(form),
        };

        let response = request
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                service: SERVICE,
                source,
            })?;

        let status = response.status();
        debug!(%method, path, status = %status, "CRM responded");

        if !status.is_success() {
            return Err(read_failure(SERVICE, response).await.into());
        }
        Ok(response)
    }

    async fn read_json(&self, response: reqwest::Response) -> Result<CrmPayload, ProxyError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| UpstreamError::Transport {
                service: SERVICE,
                source,
            })?;
        log_payload(self.inner.debug_payloads, SERVICE, "response", &text);

        let envelope = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                tracing::error!(error = %e, "Failed to parse CRM response");
                UpstreamError::decode(SERVICE, e.to_string())
            })?
        };

        Ok(CrmPayload::from_envelope(status, envelope)?)
    }
}

fn bearer(token: &str) -> Result<&str, ProxyError> {
    let token = token.trim();
    if token.is_empty() {
        Err(ProxyError::Unauthenticated)
    } else {
        Ok(token)
    }
}
