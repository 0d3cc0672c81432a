//! Client session context.
//!
//! Tracks whether the user is logged in to the portal. The portal's cookies
//! live in a `reqwest` cookie jar for the lifetime of the context; the token
//! and user are also written to a [`SessionStore`] so a later process can
//! pick the session up again.

use std::sync::Arc;

use patient_portal_core::session::names;
use patient_portal_core::{Email, SessionCookies};
use reqwest::cookie::{CookieStore, Jar};
use serde_json::{Value, json};
use tracing::instrument;
use url::Url;

use crate::error::SessionError;
use crate::store::{SessionStore, StoredSession};

const PROFILE_PATH: &str = "/api/user/profile";
const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";

/// Login state for one portal.
pub struct SessionContext<S: SessionStore> {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    store: S,
    user: Option<Value>,
    token: Option<String>,
}

impl<S: SessionStore> SessionContext<S> {
    /// Create a logged-out context for the portal at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable URL or when the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, store: S) -> Result<Self, SessionError> {
        let base_url = Url::parse(base_url)?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(concat!("patient-portal-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            jar,
            base_url,
            store,
            user: None,
            token: None,
        })
    }

    /// The logged-in user record, if known.
    #[must_use]
    pub const fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    /// The bearer token of the current session, if known.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Both a user and a token are present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Work out whether there is a live session.
    ///
    /// With a `userId` cookie in the jar the profile is fetched directly.
    /// Otherwise a stored token is put back into the jar and re-validated
    /// the same way. A 401 clears all local state; any other failure leaves
    /// the stored session in place and is returned.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for non-401 failures and store errors.
    #[instrument(skip(self))]
    pub async fn check_auth_status(&mut self) -> Result<bool, SessionError> {
        let cookies = self.cookies();
        if cookies.user_id.is_some() {
            return self.revalidate(cookies.auth_token).await;
        }

        let Some(stored) = self.store.load()? else {
            self.user = None;
            self.token = None;
            return Ok(false);
        };
        self.restore_token(&stored.token);
        self.revalidate(Some(stored.token)).await
    }

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidEmail` before any request for a
    /// malformed email, the portal's error for rejected credentials, or a
    /// store error.
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, email: &str, password: &str) -> Result<Value, SessionError> {
        let email = Email::parse(email)?;
        let response = self
            .client
            .post(self.endpoint(LOGIN_PATH)?)
            .json(&json!({ "email": email.as_str(), "password": password }))
            .send()
            .await?;
        let body = read_envelope(response).await?;

        let token = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SessionError::UnexpectedResponse("login carried no token".to_string()))?
            .to_string();
        let user = body.get("user").cloned().unwrap_or(Value::Null);

        self.store.save(&StoredSession {
            token: token.clone(),
            user: user.clone(),
        })?;
        self.token = Some(token);
        self.user = Some(user.clone());
        tracing::info!(email = %email, "Logged in");
        Ok(user)
    }

    /// Log out. Local state is cleared even when the portal call fails.
    ///
    /// A stored token is sent along when the jar has none, so a fresh process
    /// can still end the session it saved earlier.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store cannot be cleared.
    #[instrument(skip(self))]
    pub async fn logout(&mut self) -> Result<(), SessionError> {
        if self.cookies().auth_token.is_none()
            && let Ok(Some(stored)) = self.store.load()
        {
            self.restore_token(&stored.token);
        }
        if let Err(e) = self.remote_logout().await {
            tracing::warn!(error = %e, "Portal logout failed; clearing local session anyway");
        }
        self.clear_local()
    }

    async fn remote_logout(&self) -> Result<(), SessionError> {
        let response = self.client.post(self.endpoint(LOGOUT_PATH)?).send().await?;
        read_envelope(response).await.map(drop)
    }

    async fn revalidate(&mut self, token: Option<String>) -> Result<bool, SessionError> {
        match self.fetch_profile().await {
            Ok(user) => {
                if let Some(token) = &token {
                    self.store.save(&StoredSession {
                        token: token.clone(),
                        user: user.clone(),
                    })?;
                }
                self.user = Some(user);
                self.token = token;
                Ok(self.is_authenticated())
            }
            Err(e) if e.is_unauthorized() => {
                tracing::info!("Session expired");
                self.clear_local()?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_profile(&self) -> Result<Value, SessionError> {
        let response = self.client.get(self.endpoint(PROFILE_PATH)?).send().await?;
        let body = read_envelope(response).await?;
        body.get("user")
            .filter(|user| !user.is_null())
            .cloned()
            .ok_or_else(|| SessionError::UnexpectedResponse("profile carried no user".to_string()))
    }

    fn clear_local(&mut self) -> Result<(), SessionError> {
        self.user = None;
        self.token = None;
        for name in names::SESSION {
            self.jar
                .add_cookie_str(&format!("{name}=; Path=/; Max-Age=0"), &self.base_url);
        }
        self.store.clear()?;
        Ok(())
    }

    fn restore_token(&self, token: &str) {
        let cookie = format!("{}={}; Path=/", names::TOKEN, urlencoding::encode(token));
        self.jar.add_cookie_str(&cookie, &self.base_url);
    }

    fn cookies(&self) -> SessionCookies {
        self.jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().ok().map(SessionCookies::parse))
            .unwrap_or_default()
    }

    fn endpoint(&self, path: &str) -> Result<Url, SessionError> {
        Ok(self.base_url.join(path)?)
    }
}

/// Decode a portal JSON response, turning error statuses into `Api` errors.
async fn read_envelope(response: reqwest::Response) -> Result<Value, SessionError> {
    let status = response.status();
    let text = response.text().await?;
    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| SessionError::UnexpectedResponse(e.to_string()))?
    };

    if status.is_success() {
        return Ok(body);
    }
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map_or_else(
            || status.canonical_reason().unwrap_or("request failed").to_string(),
            String::from,
        );
    Err(SessionError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::store::MemoryStore;

    fn stored() -> StoredSession {
        StoredSession {
            token: "cached-token".to_string(),
            user: json!({"id": 42}),
        }
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({"email": "pat@example.com", "password": "pw"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "userId=42; Path=/")
                    .append_header("set-cookie", "authToken=tok; Path=/; HttpOnly")
                    .append_header("set-cookie", "token=tok; Path=/")
                    .set_body_json(json!({"success": true, "token": "tok", "user": {"id": 42}})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let mut ctx = SessionContext::new(&server.uri(), MemoryStore::new()).unwrap();
        let user = ctx.login("pat@example.com", "pw").await.unwrap();

        assert_eq!(user, json!({"id": 42}));
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.token(), Some("tok"));
        assert_eq!(ctx.store().load().unwrap().unwrap().token, "tok");
        assert_eq!(ctx.cookies().user_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_invalid_email_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut ctx = SessionContext::new(&server.uri(), MemoryStore::new()).unwrap();
        let err = ctx.login("not-an-email", "pw").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidEmail(_)));
    }

    #[tokio::test]
    async fn test_rejected_login_keeps_logged_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"success": false, "error": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let mut ctx = SessionContext::new(&server.uri(), MemoryStore::new()).unwrap();
        let err = ctx.login("pat@example.com", "bad").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Portal returned 401: Invalid credentials");
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_check_auth_status_with_cookie() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": true, "user": {"id": 42, "name": "Pat"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut ctx = SessionContext::new(&server.uri(), MemoryStore::new()).unwrap();
        ctx.login("pat@example.com", "pw").await.unwrap();
        assert!(ctx.check_auth_status().await.unwrap());
        assert_eq!(ctx.user().unwrap()["name"], "Pat");
    }

    #[tokio::test]
    async fn test_check_auth_status_restores_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .and(header("cookie", "token=cached-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": true, "user": {"id": 42}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::with_session(stored());
        let mut ctx = SessionContext::new(&server.uri(), store).unwrap();
        assert!(ctx.check_auth_status().await.unwrap());
        assert_eq!(ctx.token(), Some("cached-token"));
    }

    #[tokio::test]
    async fn test_unauthorized_revalidation_clears_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"success": false, "error": "Not authenticated"})),
            )
            .mount(&server)
            .await;

        let mut ctx =
            SessionContext::new(&server.uri(), MemoryStore::with_session(stored())).unwrap();
        assert!(!ctx.check_auth_status().await.unwrap());
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.store().load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_keeps_stored_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut ctx =
            SessionContext::new(&server.uri(), MemoryStore::with_session(stored())).unwrap();
        let err = ctx.check_auth_status().await.unwrap_err();
        assert!(matches!(err, SessionError::Api { status: 503, .. }));
        assert_eq!(ctx.store().load().unwrap(), Some(stored()));
    }

    #[tokio::test]
    async fn test_nothing_stored_is_logged_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut ctx = SessionContext::new(&server.uri(), MemoryStore::new()).unwrap();
        assert!(!ctx.check_auth_status().await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_portal_fails() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path(LOGOUT_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let mut ctx = SessionContext::new(&server.uri(), MemoryStore::new()).unwrap();
        ctx.login("pat@example.com", "pw").await.unwrap();
        ctx.logout().await.unwrap();

        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.store().load().unwrap(), None);
        assert_eq!(ctx.cookies(), SessionCookies::default());
    }
}
