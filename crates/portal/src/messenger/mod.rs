//! Messenger session chain.
//!
//! Opening a chat for a patient takes three dependent calls:
//!
//! 1. service auth: `POST /api/v1/session` with the service account and the
//!    shared secret, yielding a service token
//! 2. user session: `POST /api/v1/users/session` with the service token,
//!    yielding a login URL and a per-user token
//! 3. the action itself (thread search, unread count) with the user token
//!
//! Each step needs the previous step's output, so they run strictly in order
//! and the first failure ends the chain. The service token is not tied to a
//! patient and is cached for ten minutes; nothing else is cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::config::{MessengerConfig, MessengerCredentials};
use crate::upstream::{ProxyError, UpstreamError, error_message_from_body, send_json};

const SERVICE: &str = "messenger";

/// Header carrying the messenger shared secret on service auth.
pub const SHARED_SECRET_HEADER: &str = "X-Shared-Secret";

/// How long a service token is reused.
pub const SERVICE_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// A per-user messenger session (step 2 output).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub login_url: String,
    pub token: String,
}

/// Everything the browser needs to open a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReference {
    pub chat_id: Option<String>,
    pub login_url: String,
    pub auth_token: String,
    pub chat_url: String,
}

/// Threads matching a participant search.
#[derive(Debug, Clone)]
pub struct ThreadSearch {
    pub chat_id: Option<String>,
    pub threads: Value,
}

/// Client for the messenger service.
#[derive(Clone)]
pub struct MessengerClient {
    inner: Arc<MessengerClientInner>,
}

struct MessengerClientInner {
    client: reqwest::Client,
    config: MessengerConfig,
    debug_payloads: bool,
    service_tokens: Cache<String, String>,
}

impl MessengerClient {
    /// Create a new messenger client.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &MessengerConfig, debug_payloads: bool) -> Self {
        let service_tokens = Cache::builder()
            .max_capacity(16)
            .time_to_live(SERVICE_TOKEN_TTL)
            .build();

        Self {
            inner: Arc::new(MessengerClientInner {
                client,
                config: config.clone(),
                debug_payloads,
                service_tokens,
            }),
        }
    }

    /// Steps 1 and 2: a login URL and user token for `user_id`.
    ///
    /// `thread_id` may be empty to get a generic login URL.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` when any messenger variable is missing
    /// (nothing is sent), else the first failing step's error.
    #[instrument(skip(self))]
    pub async fn user_session(
        &self,
        user_id: &str,
        thread_id: Option<&str>,
    ) -> Result<UserSession, ProxyError> {
        let creds = self.inner.config.require()?;
        let service_token = self.service_token(&creds).await?;

        let url = format!("{}/api/v1/users/session", creds.base_url);
        let body = json!({
            "user_id": user_id,
            "thread_id": thread_id.unwrap_or_default(),
        });
        let response = self
            .send(
                self.inner
                    .client
                    .post(&url)
                    .bearer_auth(&service_token)
                    .json(&body),
            )
            .await?;

        let login_url = string_at(&response, &["/loginURL", "/data/loginURL", "/login_url"])
            .ok_or_else(|| UpstreamError::decode(SERVICE, "user session carried no loginURL"))?;
        let token = match string_at(&response, &["/token", "/data/token"]) {
            Some(token) => token,
            None => token_from_login_url(&login_url).ok_or_else(|| {
                UpstreamError::decode(SERVICE, "user session carried no token")
            })?,
        };

        Ok(UserSession { login_url, token })
    }

    /// Open a chat session, optionally on a specific thread.
    ///
    /// # Errors
    ///
    /// See [`MessengerClient::user_session`].
    pub async fn open_chat(
        &self,
        user_id: &str,
        thread_id: Option<&str>,
    ) -> Result<ChatReference, ProxyError> {
        let session = self.user_session(user_id, thread_id).await?;
        chat_reference(session, thread_id.map(String::from))
    }

    /// Unread message count for a user.
    ///
    /// # Errors
    ///
    /// See [`MessengerClient::user_session`].
    #[instrument(skip(self))]
    pub async fn unread_count(&self, user_id: &str) -> Result<u64, ProxyError> {
        let session = self.user_session(user_id, None).await?;
        let creds = self.inner.config.require()?;

        let url = format!("{}/api/v1/messages/unread-count", creds.base_url);
        let response = self
            .send(self.inner.client.get(&url).bearer_auth(&session.token))
            .await?;

        ["/count", "/unread_count", "/data/count", "/data/unread_count", "/data"]
            .iter()
            .find_map(|pointer| response.pointer(pointer).and_then(Value::as_u64))
            .ok_or_else(|| UpstreamError::decode(SERVICE, "unread count missing").into())
    }

    /// Search threads whose participants include every id in `participants`.
    ///
    /// # Errors
    ///
    /// See [`MessengerClient::user_session`].
    #[instrument(skip(self))]
    pub async fn search_threads(
        &self,
        user_id: &str,
        participants: &[String],
    ) -> Result<(UserSession, ThreadSearch), ProxyError> {
        let session = self.user_session(user_id, None).await?;
        let creds = self.inner.config.require()?;

        let mut url = Url::parse(&format!("{}/api/v1/threads/search", creds.base_url))
            .map_err(|e| UpstreamError::decode(SERVICE, e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("participant_ids", &participants.join(","));

        let response = self
            .send(self.inner.client.get(url).bearer_auth(&session.token))
            .await?;

        let threads = ["/threads", "/data/threads", "/data"]
            .iter()
            .filter_map(|pointer| response.pointer(pointer))
            .find(|v| v.is_array())
            .cloned()
            .unwrap_or_else(|| {
                if response.is_array() {
                    response.clone()
                } else {
                    Value::Array(Vec::new())
                }
            });
        let chat_id = threads
            .as_array()
            .and_then(|list| list.first())
            .and_then(|thread| scalar_at(thread, &["/id", "/_id", "/thread_id"]));

        Ok((session, ThreadSearch { chat_id, threads }))
    }

    /// Find the chat thread tied to a subscription.
    ///
    /// # Errors
    ///
    /// See [`MessengerClient::user_session`].
    pub async fn subscription_thread(
        &self,
        user_id: &str,
        subscription_id: &str,
    ) -> Result<ChatReference, ProxyError> {
        let participants = [user_id.to_string(), format!("subscription-{subscription_id}")];
        let (session, search) = self.search_threads(user_id, &participants).await?;
        chat_reference(session, search.chat_id)
    }

    async fn service_token(&self, creds: &MessengerCredentials<'_>) -> Result<String, ProxyError> {
        let key = format!("{}|{}", creds.base_url, creds.email);
        if let Some(token) = self.inner.service_tokens.get(&key).await {
            debug!("Using cached messenger service token");
            return Ok(token);
        }

        let url = format!("{}/api/v1/session", creds.base_url);
        let response = self
            .send(
                self.inner
                    .client
                    .post(&url)
                    .header(SHARED_SECRET_HEADER, creds.secret)
                    .json(&json!({"email": creds.email, "password": creds.password})),
            )
            .await?;

        let token = string_at(&response, &["/token", "/data/token", "/access_token"])
            .ok_or_else(|| UpstreamError::decode(SERVICE, "service session carried no token"))?;

        // Concurrent misses may both fetch; last write wins
        self.inner.service_tokens.insert(key, token.clone()).await;
        Ok(token)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProxyError> {
        let body = send_json(SERVICE, request, self.inner.debug_payloads)
            .await?
            .body;

        if body.get("success") == Some(&Value::Bool(false)) {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: StatusCode::BAD_REQUEST,
                message: error_message_from_body(&body)
                    .unwrap_or_else(|| "Messenger request failed".to_string()),
                details: Some(body),
            }
            .into());
        }
        Ok(body)
    }
}

fn chat_reference(
    session: UserSession,
    chat_id: Option<String>,
) -> Result<ChatReference, ProxyError> {
    let chat_url = match &chat_id {
        Some(chat_id) => {
            let mut url = Url::parse(&session.login_url)
                .map_err(|e| UpstreamError::decode(SERVICE, format!("invalid loginURL: {e}")))?;
            url.query_pairs_mut().append_pair("chat_id", chat_id);
            url.to_string()
        }
        None => session.login_url.clone(),
    };

    Ok(ChatReference {
        chat_id,
        login_url: session.login_url,
        auth_token: session.token,
        chat_url,
    })
}

/// The user token embedded in a login URL as the `q` query parameter.
#[must_use]
pub fn token_from_login_url(login_url: &str) -> Option<String> {
    Url::parse(login_url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

fn string_at(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn scalar_at(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| match body.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
