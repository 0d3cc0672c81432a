//! Integration tests for the patient portal.
//!
//! Each test builds the full router in-process, points the upstream
//! variables at `wiremock` servers and drives it with
//! `tower::ServiceExt::oneshot`. No network listener and no real upstream is
//! involved.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p patient-portal-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `auth_required` - cookie checks before any upstream call
//! - `config_required` - missing upstream variables
//! - `validation` - malformed input rejected before any upstream call
//! - `session_cookies` - login, logout and auto-login cookie handling
//! - `crm_proxy` - envelope normalization and error mirroring
//! - `messenger_chain` - the three-step messenger session
//! - `store` - cart, checkout URL, variations and address lookup

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use patient_portal::config::PortalConfig;
use patient_portal::routes;
use patient_portal::services::woocommerce::VariationCache;
use patient_portal::state::AppState;
use serde_json::Value;
use tower::ServiceExt;

/// Largest response body the helpers will buffer.
const BODY_LIMIT: usize = 1024 * 1024;

/// Portal configuration from `(NAME, value)` pairs; anything absent is unset.
///
/// # Panics
///
/// Panics if a server-level variable is invalid.
#[must_use]
pub fn config(vars: &[(&str, &str)]) -> PortalConfig {
    PortalConfig::from_lookup(|key| {
        vars.iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| (*value).to_string())
    })
    .expect("test configuration is valid")
}

/// The full application router over `vars`.
///
/// # Panics
///
/// Panics if the state cannot be built.
#[must_use]
pub fn app(vars: &[(&str, &str)]) -> Router {
    routes::app(AppState::new(config(vars)).expect("state builds"))
}

/// The full application router with an injected variation cache.
///
/// # Panics
///
/// Panics if the state cannot be built.
#[must_use]
pub fn app_with_variation_cache(vars: &[(&str, &str)], cache: VariationCache) -> Router {
    routes::app(AppState::with_variation_cache(config(vars), cache).expect("state builds"))
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// The body as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    /// Every `Set-Cookie` header, parsed.
    #[must_use]
    pub fn set_cookies(&self) -> Vec<cookie::Cookie<'static>> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| cookie::Cookie::parse(value.to_string()).ok())
            .collect()
    }

    /// The `Set-Cookie` for `name`, if any.
    #[must_use]
    pub fn set_cookie(&self, name: &str) -> Option<cookie::Cookie<'static>> {
        self.set_cookies().into_iter().find(|c| c.name() == name)
    }
}

/// Request builder shorthand.
pub struct TestRequest {
    method: Method,
    uri: String,
    cookies: Vec<String>,
    content_type: Option<String>,
    body: Body,
}

impl TestRequest {
    #[must_use]
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            cookies: Vec::new(),
            content_type: None,
            body: Body::empty(),
        }
    }

    #[must_use]
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    #[must_use]
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Add a `name=value` cookie.
    #[must_use]
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(format!("{name}={value}"));
        self
    }

    /// A logged-in patient: `userId` and `authToken` cookies.
    #[must_use]
    pub fn logged_in(self, user_id: &str, token: &str) -> Self {
        self.cookie("userId", user_id).cookie("authToken", token)
    }

    /// A JSON body.
    #[must_use]
    pub fn json(mut self, body: &Value) -> Self {
        self.content_type = Some("application/json".to_string());
        self.body = Body::from(body.to_string());
        self
    }

    /// A raw body with an explicit content type.
    #[must_use]
    pub fn raw(mut self, content_type: &str, body: impl Into<Body>) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body.into();
        self
    }

    /// Send through `app` and buffer the response.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    pub async fn send(self, app: Router) -> TestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if !self.cookies.is_empty() {
            builder = builder.header(header::COOKIE, self.cookies.join("; "));
        }
        if let Some(content_type) = self.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(self.body).expect("request builds");

        let response = app.oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .expect("body readable")
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// A minimal `multipart/form-data` body builder.
#[derive(Debug)]
pub struct MultipartBody {
    boundary: &'static str,
    body: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self {
            boundary: "portal-test-boundary",
            body: Vec::new(),
        }
    }
}

impl MultipartBody {
    #[must_use]
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    #[must_use]
    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// `(content type, body)` ready for [`TestRequest::raw`].
    #[must_use]
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}
