//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::PortalConfig;
use crate::crm::CrmClient;
use crate::messenger::MessengerClient;
use crate::services::woocommerce::VariationCache;
use crate::services::{MeetingsClient, PostCanadaClient, WooCommerceClient};

/// Error creating the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Holds the configuration and one client per
/// upstream; every client shares the same connection pool.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PortalConfig,
    crm: CrmClient,
    messenger: MessengerClient,
    woocommerce: WooCommerceClient,
    meetings: MeetingsClient,
    postcanada: PostCanadaClient,
}

impl AppState {
    /// Create the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: PortalConfig) -> Result<Self, StateError> {
        let http = http_client()?;
        let woocommerce =
            WooCommerceClient::new(http.clone(), &config.woocommerce, config.debug_payloads);
        Ok(Self::assemble(config, http, woocommerce))
    }

    /// Create the application state with a caller-supplied variation cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_variation_cache(
        config: PortalConfig,
        variations: VariationCache,
    ) -> Result<Self, StateError> {
        let http = http_client()?;
        let woocommerce = WooCommerceClient::with_variation_cache(
            http.clone(),
            &config.woocommerce,
            config.debug_payloads,
            variations,
        );
        Ok(Self::assemble(config, http, woocommerce))
    }

    fn assemble(config: PortalConfig, http: reqwest::Client, woocommerce: WooCommerceClient) -> Self {
        let debug = config.debug_payloads;
        Self {
            inner: Arc::new(AppStateInner {
                crm: CrmClient::new(http.clone(), &config.crm, debug),
                messenger: MessengerClient::new(http.clone(), &config.messenger, debug),
                meetings: MeetingsClient::new(http.clone(), &config.meetings, debug),
                postcanada: PostCanadaClient::new(http, &config.postcanada, debug),
                woocommerce,
                config,
            }),
        }
    }

    /// Get a reference to the portal configuration.
    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// Get a reference to the CRM client.
    #[must_use]
    pub fn crm(&self) -> &CrmClient {
        &self.inner.crm
    }

    /// Get a reference to the messenger client.
    #[must_use]
    pub fn messenger(&self) -> &MessengerClient {
        &self.inner.messenger
    }

    /// Get a reference to the WooCommerce client.
    #[must_use]
    pub fn woocommerce(&self) -> &WooCommerceClient {
        &self.inner.woocommerce
    }

    /// Get a reference to the meetings client.
    #[must_use]
    pub fn meetings(&self) -> &MeetingsClient {
        &self.inner.meetings
    }

    /// Get a reference to the Canada Post client.
    #[must_use]
    pub fn postcanada(&self) -> &PostCanadaClient {
        &self.inner.postcanada
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.inner.config.secure_cookies()
    }
}

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("patient-portal/", env!("CARGO_PKG_VERSION")))
        .build()
}
