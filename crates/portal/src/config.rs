//! Portal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Server (validated at startup)
//! - `PORTAL_HOST` - Bind address (default: 127.0.0.1)
//! - `PORTAL_PORT` - Listen port (default: 3000)
//! - `BASE_URL` / `NEXT_PUBLIC_BASE_URL` - Public URL of the portal
//! - `PORTAL_DEBUG_PAYLOADS` - Log upstream request/response bodies (default: false)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Upstreams (checked per request)
//! - `CRM_HOST` - CRM REST API base URL
//! - `MESSENGER_BASE_URL`, `MESSENGER_EMAIL`, `MESSENGER_PASSWORD`, `MESSENGER_SECRET`
//! - `NEXT_PUBLIC_ROCKY_API_URL` - WooCommerce store URL
//! - `CONSUMER_KEY`, `CONSUMER_SECRET` - WooCommerce REST credentials
//! - `CALENDLY_BASE_URL` - Meetings API base URL
//! - `POSTCANADA_API_KEY` - Canada Post `AddressComplete` key
//! - `POSTCANADA_BASE_URL` - `AddressComplete` endpoint override
//!
//! A missing upstream variable does not stop the server. The routes that need
//! it answer 500 without making any outbound call, and the log names the
//! variable.

use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Default Canada Post `AddressComplete` interactive endpoint.
pub const DEFAULT_POSTCANADA_BASE_URL: &str =
    "https://ws1.postescanada-canadapost.ca/AddressComplete/Interactive";

/// Configuration errors that can occur during loading or at request time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(&'static str, String),
}

/// Portal application configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the portal
    pub base_url: String,
    /// Log upstream payloads (truncated) at debug level
    pub debug_payloads: bool,
    pub crm: CrmConfig,
    pub messenger: MessengerConfig,
    pub woocommerce: WooCommerceConfig,
    pub meetings: MeetingsConfig,
    pub postcanada: PostCanadaConfig,
    pub sentry: SentryConfig,
}

/// CRM REST API configuration.
#[derive(Debug, Clone, Default)]
pub struct CrmConfig {
    pub host: Option<String>,
}

/// Messenger service account configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone, Default)]
pub struct MessengerConfig {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub password: Option<SecretString>,
    pub secret: Option<SecretString>,
}

/// Messenger settings once every required variable is known to be present.
pub struct MessengerCredentials<'a> {
    pub base_url: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub secret: &'a str,
}

/// WooCommerce REST and Store API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone, Default)]
pub struct WooCommerceConfig {
    pub store_url: Option<String>,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<SecretString>,
}

/// Meetings API (Calendly front) configuration.
#[derive(Debug, Clone, Default)]
pub struct MeetingsConfig {
    pub base_url: Option<String>,
}

/// Canada Post `AddressComplete` configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PostCanadaConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

/// Sentry error tracking configuration.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

impl std::fmt::Debug for MessengerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessengerConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &redacted(self.password.as_ref()))
            .field("secret", &redacted(self.secret.as_ref()))
            .finish()
    }
}

impl std::fmt::Debug for WooCommerceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WooCommerceConfig")
            .field("store_url", &self.store_url)
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &redacted(self.consumer_secret.as_ref()))
            .finish()
    }
}

impl std::fmt::Debug for PostCanadaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostCanadaConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redacted(self.api_key.as_ref()))
            .finish()
    }
}

impl Default for PostCanadaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_POSTCANADA_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

const fn redacted(secret: Option<&SecretString>) -> Option<&'static str> {
    match secret {
        Some(_) => Some("[REDACTED]"),
        None => None,
    }
}

impl PortalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a server-level variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a server-level variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("PORTAL_HOST")
            .unwrap_or_else(|| "127.0.0.1".to_string())
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORTAL_HOST", e.to_string()))?;
        let port = get("PORTAL_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORTAL_PORT", e.to_string()))?;
        let base_url = get("BASE_URL")
            .or_else(|| get("NEXT_PUBLIC_BASE_URL"))
            .unwrap_or_else(|| format!("http://{host}:{port}"));
        let debug_payloads = match get("PORTAL_DEBUG_PAYLOADS") {
            Some(raw) => parse_bool("PORTAL_DEBUG_PAYLOADS", &raw)?,
            None => false,
        };

        let sentry = SentryConfig {
            dsn: get("SENTRY_DSN"),
            environment: get("SENTRY_ENVIRONMENT"),
            sample_rate: parse_rate("SENTRY_SAMPLE_RATE", get("SENTRY_SAMPLE_RATE"), 1.0)?,
            traces_sample_rate: parse_rate(
                "SENTRY_TRACES_SAMPLE_RATE",
                get("SENTRY_TRACES_SAMPLE_RATE"),
                0.0,
            )?,
        };

        Ok(Self {
            host,
            port,
            base_url,
            debug_payloads,
            crm: CrmConfig {
                host: get("CRM_HOST").map(trim_trailing_slash),
            },
            messenger: MessengerConfig {
                base_url: get("MESSENGER_BASE_URL").map(trim_trailing_slash),
                email: get("MESSENGER_EMAIL"),
                password: get("MESSENGER_PASSWORD").map(SecretString::from),
                secret: get("MESSENGER_SECRET").map(SecretString::from),
            },
            woocommerce: WooCommerceConfig {
                store_url: get("NEXT_PUBLIC_ROCKY_API_URL").map(trim_trailing_slash),
                consumer_key: get("CONSUMER_KEY"),
                consumer_secret: get("CONSUMER_SECRET").map(SecretString::from),
            },
            meetings: MeetingsConfig {
                base_url: get("CALENDLY_BASE_URL").map(trim_trailing_slash),
            },
            postcanada: PostCanadaConfig {
                base_url: get("POSTCANADA_BASE_URL")
                    .map_or_else(|| DEFAULT_POSTCANADA_BASE_URL.to_string(), trim_trailing_slash),
                api_key: get("POSTCANADA_API_KEY").map(SecretString::from),
            },
            sentry,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CrmConfig {
    /// The CRM base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `CRM_HOST` is unset.
    pub fn require_host(&self) -> Result<&str, ConfigError> {
        self.host
            .as_deref()
            .ok_or(ConfigError::MissingEnvVar("CRM_HOST"))
    }
}

impl MessengerConfig {
    /// All messenger settings at once.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` naming the first unset variable.
    pub fn require(&self) -> Result<MessengerCredentials<'_>, ConfigError> {
        Ok(MessengerCredentials {
            base_url: self
                .base_url
                .as_deref()
                .ok_or(ConfigError::MissingEnvVar("MESSENGER_BASE_URL"))?,
            email: self
                .email
                .as_deref()
                .ok_or(ConfigError::MissingEnvVar("MESSENGER_EMAIL"))?,
            password: self
                .password
                .as_ref()
                .ok_or(ConfigError::MissingEnvVar("MESSENGER_PASSWORD"))?
                .expose_secret(),
            secret: self
                .secret
                .as_ref()
                .ok_or(ConfigError::MissingEnvVar("MESSENGER_SECRET"))?
                .expose_secret(),
        })
    }
}

impl WooCommerceConfig {
    /// The store base URL (enough for the Store API).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when the store URL is unset.
    pub fn require_store_url(&self) -> Result<&str, ConfigError> {
        self.store_url
            .as_deref()
            .ok_or(ConfigError::MissingEnvVar("NEXT_PUBLIC_ROCKY_API_URL"))
    }

    /// Store URL plus REST API consumer key and secret.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` naming the first unset variable.
    pub fn require_rest(&self) -> Result<(&str, &str, &str), ConfigError> {
        let store_url = self.require_store_url()?;
        let key = self
            .consumer_key
            .as_deref()
            .ok_or(ConfigError::MissingEnvVar("CONSUMER_KEY"))?;
        let secret = self
            .consumer_secret
            .as_ref()
            .ok_or(ConfigError::MissingEnvVar("CONSUMER_SECRET"))?
            .expose_secret();
        Ok((store_url, key, secret))
    }
}

impl MeetingsConfig {
    /// The meetings API base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `CALENDLY_BASE_URL` is unset.
    pub fn require_base_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .ok_or(ConfigError::MissingEnvVar("CALENDLY_BASE_URL"))
    }
}

impl PostCanadaConfig {
    /// The `AddressComplete` API key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `POSTCANADA_API_KEY` is unset.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .ok_or(ConfigError::MissingEnvVar("POSTCANADA_API_KEY"))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn trim_trailing_slash(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

fn parse_rate(key: &'static str, raw: Option<String>, default: f32) -> Result<f32, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let rate = raw
        .trim()
        .parse::<f32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key, e.to_string()))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(ConfigError::InvalidEnvVar(
            key,
            format!("must be between 0 and 1 (got {rate})"),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<PortalConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        PortalConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_any_variable() {
        let config = load(&[]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.base_url, "http://127.0.0.1:3000");
        assert!(!config.debug_payloads);
        assert!(config.crm.host.is_none());
        assert!(!config.secure_cookies());
    }

    #[test]
    fn test_missing_crm_host_is_reported_on_use() {
        let config = load(&[]).unwrap();
        let err = config.crm.require_host().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("CRM_HOST")));
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = load(&[("CRM_HOST", "   ")]).unwrap();
        assert!(config.crm.require_host().is_err());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = load(&[("CRM_HOST", "https://crm.example.com/")]).unwrap();
        assert_eq!(config.crm.require_host().unwrap(), "https://crm.example.com");
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[("PORTAL_PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar("PORTAL_PORT", _)));
    }

    #[test]
    fn test_debug_payloads_flag() {
        assert!(load(&[("PORTAL_DEBUG_PAYLOADS", "true")]).unwrap().debug_payloads);
        assert!(load(&[("PORTAL_DEBUG_PAYLOADS", "maybe")]).is_err());
    }

    #[test]
    fn test_sample_rate_bounds() {
        assert!(load(&[("SENTRY_SAMPLE_RATE", "1.5")]).is_err());
        let config = load(&[("SENTRY_TRACES_SAMPLE_RATE", "0.25")]).unwrap();
        assert!((config.sentry.traces_sample_rate - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_messenger_requires_every_variable() {
        let config = load(&[
            ("MESSENGER_BASE_URL", "https://chat.example.com"),
            ("MESSENGER_EMAIL", "svc@example.com"),
            ("MESSENGER_PASSWORD", "pw"),
        ])
        .unwrap();
        let err = config.messenger.require().err().unwrap();
        assert!(matches!(err, ConfigError::MissingEnvVar("MESSENGER_SECRET")));
    }

    #[test]
    fn test_secure_cookies_follow_base_url() {
        let config = load(&[("BASE_URL", "https://portal.example.com")]).unwrap();
        assert!(config.secure_cookies());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("MESSENGER_PASSWORD", "super_secret_password_value"),
            ("MESSENGER_SECRET", "shared_secret_value"),
            ("CONSUMER_SECRET", "cs_secret_value"),
            ("POSTCANADA_API_KEY", "pc_key_value"),
        ])
        .unwrap();

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_value"));
        assert!(!debug_output.contains("shared_secret_value"));
        assert!(!debug_output.contains("cs_secret_value"));
        assert!(!debug_output.contains("pc_key_value"));
    }
}
