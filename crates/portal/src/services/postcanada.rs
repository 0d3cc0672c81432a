//! Canada Post `AddressComplete` lookups.
//!
//! `Find` turns a partial address into candidates; `Retrieve` expands one
//! candidate id into a full address. The API reports failures as an `Items`
//! entry with an `Error` field, under a 200 status.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::config::PostCanadaConfig;
use crate::upstream::{ProxyError, UpstreamError, send_json};

const SERVICE: &str = "postcanada";

const FIND_PATH: &str = "Find/v2.10/json3.ws";
const RETRIEVE_PATH: &str = "Retrieve/v2.11/json3.ws";

/// What to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressQuery {
    /// Expand a candidate id into a full address.
    Retrieve(String),
    /// Search by free text.
    Find(String),
}

impl AddressQuery {
    /// Prefer the address id; fall back to the search term. Blank values are
    /// ignored.
    #[must_use]
    pub fn from_inputs(address_id: Option<&str>, search_term: Option<&str>) -> Option<Self> {
        let non_blank = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(String::from);
        non_blank(address_id)
            .map(Self::Retrieve)
            .or_else(|| non_blank(search_term).map(Self::Find))
    }
}

/// Client for the `AddressComplete` API.
#[derive(Clone)]
pub struct PostCanadaClient {
    inner: Arc<PostCanadaClientInner>,
}

struct PostCanadaClientInner {
    client: reqwest::Client,
    config: PostCanadaConfig,
    debug_payloads: bool,
}

impl PostCanadaClient {
    #[must_use]
    pub fn new(client: reqwest::Client, config: &PostCanadaConfig, debug_payloads: bool) -> Self {
        Self {
            inner: Arc::new(PostCanadaClientInner {
                client,
                config: config.clone(),
                debug_payloads,
            }),
        }
    }

    /// Run a lookup and return the `Items` array.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` when the API key is missing, or an
    /// upstream error (400) when an item carries an `Error` field.
    #[instrument(skip(self))]
    pub async fn lookup(&self, query: &AddressQuery) -> Result<Value, ProxyError> {
        let key = self.inner.config.require_api_key()?;
        let base = &self.inner.config.base_url;

        let (endpoint, param, value) = match query {
            AddressQuery::Retrieve(id) => (RETRIEVE_PATH, "Id", id),
            AddressQuery::Find(term) => (FIND_PATH, "SearchTerm", term),
        };
        let mut url = Url::parse(&format!("{base}/{endpoint}"))
            .map_err(|e| UpstreamError::decode(SERVICE, format!("invalid base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("Key", key)
            .append_pair(param, value);

        let body = send_json(SERVICE, self.inner.client.get(url), self.inner.debug_payloads)
            .await?
            .body;
        Ok(items(body)?)
    }
}

fn items(body: Value) -> Result<Value, UpstreamError> {
    let items = match body {
        Value::Object(mut map) => map.remove("Items").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };

    let failure = items
        .as_array()
        .and_then(|list| list.iter().find(|item| item.get("Error").is_some()));
    if let Some(failure) = failure {
        let message = ["Description", "Cause"]
            .iter()
            .find_map(|key| failure.get(*key).and_then(Value::as_str))
            .unwrap_or("Address lookup failed")
            .to_string();
        return Err(UpstreamError::Status {
            service: SERVICE,
            status: StatusCode::BAD_REQUEST,
            message,
            details: Some(failure.clone()),
        });
    }

    Ok(items)
}
