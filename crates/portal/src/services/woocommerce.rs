//! WooCommerce REST and Store API clients.
//!
//! The REST API (consumer key/secret as query parameters) serves product
//! variations, cached per product for 30 minutes. The Store API serves the
//! shopper's cart and is keyed by the `Nonce` header that WooCommerce rotates
//! on every response.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use patient_portal_core::{CartItem, ProductId};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::config::WooCommerceConfig;
use crate::upstream::{ProxyError, UpstreamError, send_json};

const SERVICE: &str = "woocommerce";

/// Request header and response header carrying the Store API nonce.
pub const NONCE_HEADER: &str = "Nonce";

/// Abort outbound WooCommerce calls after five minutes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default lifetime of cached product variations.
pub const VARIATION_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Per-product variation cache. Concurrent misses may both fetch; the last
/// write wins.
pub type VariationCache = Cache<ProductId, Value>;

/// Build a variation cache with the given lifetime.
#[must_use]
pub fn variation_cache(ttl: Duration) -> VariationCache {
    Cache::builder()
        .max_capacity(1_000)
        .time_to_live(ttl)
        .build()
}

/// A Store API response and the nonce to use next.
#[derive(Debug, Clone)]
pub struct StoreResponse {
    pub body: Value,
    pub nonce: Option<String>,
}

/// Client for the WooCommerce store.
#[derive(Clone)]
pub struct WooCommerceClient {
    inner: Arc<WooCommerceClientInner>,
}

struct WooCommerceClientInner {
    client: reqwest::Client,
    config: WooCommerceConfig,
    debug_payloads: bool,
    variations: VariationCache,
}

impl WooCommerceClient {
    /// Create a client with the default 30-minute variation cache.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &WooCommerceConfig, debug_payloads: bool) -> Self {
        Self::with_variation_cache(
            client,
            config,
            debug_payloads,
            variation_cache(VARIATION_CACHE_TTL),
        )
    }

    /// Create a client around a caller-supplied variation cache.
    #[must_use]
    pub fn with_variation_cache(
        client: reqwest::Client,
        config: &WooCommerceConfig,
        debug_payloads: bool,
        variations: VariationCache,
    ) -> Self {
        Self {
            inner: Arc::new(WooCommerceClientInner {
                client,
                config: config.clone(),
                debug_payloads,
                variations,
            }),
        }
    }

    /// The variation cache, for inspection and invalidation.
    #[must_use]
    pub fn variation_cache(&self) -> &VariationCache {
        &self.inner.variations
    }

    /// Product variations, unformatted, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` when the store URL or REST credentials are
    /// missing, else the upstream failure.
    #[instrument(skip(self, product_id), fields(product_id = %product_id))]
    pub async fn variations(&self, product_id: ProductId) -> Result<Value, ProxyError> {
        let (store_url, key, secret) = self.inner.config.require_rest()?;

        if let Some(cached) = self.inner.variations.get(&product_id).await {
            debug!("Cache hit for product variations");
            return Ok(cached);
        }

        let mut url = parse_url(&format!(
            "{store_url}/wp-json/wc/v3/products/{product_id}/variations"
        ))?;
        url.query_pairs_mut()
            .append_pair("consumer_key", key)
            .append_pair("consumer_secret", secret)
            .append_pair("per_page", "100");

        let variations = send_json(
            SERVICE,
            self.inner.client.get(url).timeout(REQUEST_TIMEOUT),
            self.inner.debug_payloads,
        )
        .await?
        .body;

        self.inner
            .variations
            .insert(product_id, variations.clone())
            .await;
        Ok(variations)
    }

    /// The shopper's Store API cart.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` when the store URL is missing, else the
    /// upstream failure.
    #[instrument(skip(self, nonce))]
    pub async fn cart(&self, nonce: Option<&str>) -> Result<StoreResponse, ProxyError> {
        let store_url = self.inner.config.require_store_url()?;
        let request = self
            .inner
            .client
            .get(format!("{store_url}/wp-json/wc/store/v1/cart"));
        self.store_call(request, nonce).await
    }

    /// Add one item to the Store API cart.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` when the store URL is missing, else the
    /// upstream failure.
    #[instrument(skip(self, nonce), fields(product_id = %item.product_id))]
    pub async fn add_to_cart(
        &self,
        item: &CartItem,
        nonce: Option<&str>,
    ) -> Result<StoreResponse, ProxyError> {
        let store_url = self.inner.config.require_store_url()?;
        let request = self
            .inner
            .client
            .post(format!("{store_url}/wp-json/wc/store/v1/cart/add-item"))
            .json(&add_item_body(item));
        self.store_call(request, nonce).await
    }

    /// Checkout redirect URL that adds a single item to the cart.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` when the store URL is missing.
    pub fn checkout_url(&self, item: &CartItem) -> Result<String, ProxyError> {
        let store_url = self.inner.config.require_store_url()?;
        let mut url = parse_url(&format!("{store_url}/checkout/"))?;
        url.query_pairs_mut()
            .append_pair("add-to-cart", &item.purchasable_id().to_string())
            .append_pair("quantity", &item.quantity.get().to_string());
        Ok(url.to_string())
    }

    async fn store_call(
        &self,
        request: reqwest::RequestBuilder,
        nonce: Option<&str>,
    ) -> Result<StoreResponse, ProxyError> {
        let mut request = request.timeout(REQUEST_TIMEOUT);
        if let Some(nonce) = nonce {
            request = request.header(NONCE_HEADER, nonce);
        }

        let response = send_json(SERVICE, request, self.inner.debug_payloads).await?;
        let nonce = response
            .headers
            .get(NONCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from);

        Ok(StoreResponse {
            body: response.body,
            nonce,
        })
    }
}

/// Store API `add-item` request body.
fn add_item_body(item: &CartItem) -> Value {
    let variation: Vec<Value> = item
        .variation_attributes()
        .into_iter()
        .map(|(attribute, value)| json!({"attribute": attribute, "value": value}))
        .collect();

    let mut body = json!({
        "id": item.purchasable_id(),
        "quantity": item.quantity,
    });
    if !variation.is_empty() {
        body["variation"] = Value::Array(variation);
    }
    body
}

fn parse_url(raw: &str) -> Result<Url, UpstreamError> {
    Url::parse(raw).map_err(|e| UpstreamError::decode(SERVICE, format!("invalid store URL: {e}")))
}
