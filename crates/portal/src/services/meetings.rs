//! Meetings API (fronting Calendly) client.

use std::sync::Arc;

use patient_portal_core::Email;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::config::MeetingsConfig;
use crate::upstream::{ProxyError, UpstreamError, send_json};

const SERVICE: &str = "meetings";

/// Client for the meetings API.
#[derive(Clone)]
pub struct MeetingsClient {
    inner: Arc<MeetingsClientInner>,
}

struct MeetingsClientInner {
    client: reqwest::Client,
    config: MeetingsConfig,
    debug_payloads: bool,
}

impl MeetingsClient {
    #[must_use]
    pub fn new(client: reqwest::Client, config: &MeetingsConfig, debug_payloads: bool) -> Self {
        Self {
            inner: Arc::new(MeetingsClientInner {
                client,
                config: config.clone(),
                debug_payloads,
            }),
        }
    }

    /// Meetings booked by `email`.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` when `CALENDLY_BASE_URL` is missing, else
    /// the upstream failure.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn meetings(&self, email: &Email) -> Result<Value, ProxyError> {
        let base = self.inner.config.require_base_url()?;
        let mut url = Url::parse(&format!("{base}/meetings"))
            .map_err(|e| UpstreamError::decode(SERVICE, format!("invalid base URL: {e}")))?;
        url.query_pairs_mut().append_pair("email", email.as_str());

        let body = send_json(SERVICE, self.inner.client.get(url), self.inner.debug_payloads)
            .await?
            .body;
        Ok(meetings(body))
    }
}

fn meetings(body: Value) -> Value {
    if body.is_array() {
        return body;
    }
    ["/meetings", "/data/meetings", "/data", "/collection"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .find(|v| v.is_array())
        .cloned()
        .unwrap_or(body)
}
