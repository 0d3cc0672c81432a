//! Cookie session extractors and the `Set-Cookie` writer.
//!
//! The `Cookie` header is parsed once per request and the result is cached in
//! request extensions, so handlers that pull several extractors never re-parse.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, header, request::Parts},
    response::{IntoResponse, IntoResponseParts, Response, ResponseParts},
};
use cookie::{Cookie, SameSite, time::Duration};
use patient_portal_core::SessionCookies;
use patient_portal_core::session::{
    CART_NONCE_MAX_AGE_SECONDS, SESSION_MAX_AGE_SECONDS, names,
};

use crate::error::AppError;

// =============================================================================
// Extractors
// =============================================================================

/// The parsed session cookies of the current request. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct Session(pub SessionCookies);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Self>() {
            return Ok(session.clone());
        }

        let headers = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok());
        let session = Self(SessionCookies::parse_all(headers));

        parts.extensions.insert(session.clone());
        Ok(session)
    }
}

/// A request that carries a bearer token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: String,
    pub cookies: SessionCookies,
}

/// Extractor that requires a bearer token (`token` or `authToken` cookie).
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireToken(auth): RequireToken) -> impl IntoResponse {
///     state.crm().profile(&auth.token).await
/// }
/// ```
pub struct RequireToken(pub Authenticated);

/// Extractor that requires the `userId` cookie.
pub struct RequireUserId {
    pub user_id: String,
    pub cookies: SessionCookies,
}

/// Error returned when a session cookie is required but missing.
#[derive(Debug)]
pub enum SessionRejection {
    MissingToken,
    MissingUserId,
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingToken => "Not authenticated",
            Self::MissingUserId => "User not logged in",
        };
        AppError::Unauthorized(message.to_string()).into_response()
    }
}

impl<S> FromRequestParts<S> for RequireToken
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(Session(cookies)) = Session::from_request_parts(parts, state).await;
        let token = cookies
            .auth_token
            .clone()
            .ok_or(SessionRejection::MissingToken)?;
        Ok(Self(Authenticated { token, cookies }))
    }
}

impl<S> FromRequestParts<S> for RequireUserId
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(Session(cookies)) = Session::from_request_parts(parts, state).await;
        let user_id = cookies
            .user_id
            .clone()
            .ok_or(SessionRejection::MissingUserId)?;
        Ok(Self { user_id, cookies })
    }
}

// =============================================================================
// Set-Cookie writer
// =============================================================================

/// Identity written to cookies after a successful login or auto-login.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub user_id: String,
    pub wp_user_id: Option<String>,
    pub email: Option<String>,
    pub token: String,
}

/// A batch of `Set-Cookie` headers, usable as a response part.
#[derive(Debug, Default)]
pub struct SetCookies(Vec<Cookie<'static>>);

impl SetCookies {
    /// Cookies for a fresh login session (7 days).
    #[must_use]
    pub fn session(session: &LoginSession, secure: bool) -> Self {
        let mut cookies = vec![
            session_cookie(names::USER_ID, &session.user_id, false, secure),
            session_cookie(names::AUTH_TOKEN, &session.token, true, secure),
            session_cookie(names::TOKEN, &session.token, false, secure),
        ];
        if let Some(wp_user_id) = &session.wp_user_id {
            cookies.push(session_cookie(names::WP_USER_ID, wp_user_id, false, secure));
        }
        if let Some(email) = &session.email {
            cookies.push(session_cookie(names::USER_EMAIL, email, false, secure));
        }
        Self(cookies)
    }

    /// Expire every session cookie (empty value, `Max-Age=0`).
    #[must_use]
    pub fn cleared(secure: bool) -> Self {
        Self(
            names::SESSION
                .iter()
                .map(|name| {
                    Cookie::build((*name, ""))
                        .path("/")
                        .max_age(Duration::ZERO)
                        .same_site(SameSite::Lax)
                        .http_only(*name == names::AUTH_TOKEN)
                        .secure(secure)
                        .build()
                })
                .collect(),
        )
    }

    /// The WooCommerce Store API nonce (24 hours).
    #[must_use]
    pub fn cart_nonce(nonce: &str, secure: bool) -> Self {
        Self(vec![
            Cookie::build((names::CART_NONCE, encode(nonce)))
                .path("/")
                .max_age(Duration::seconds(CART_NONCE_MAX_AGE_SECONDS))
                .same_site(SameSite::Lax)
                .http_only(true)
                .secure(secure)
                .build(),
        ])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the cookies in this batch.
    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.0.iter()
    }
}

impl IntoResponseParts for SetCookies {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for cookie in self.0 {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    res.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(cookie = cookie.name(), error = %e, "Skipping invalid cookie"),
            }
        }
        Ok(res)
    }
}

fn session_cookie(
    name: &'static str,
    value: &str,
    http_only: bool,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, encode(value)))
        .path("/")
        .max_age(Duration::seconds(SESSION_MAX_AGE_SECONDS))
        .same_site(SameSite::Lax)
        .http_only(http_only)
        .secure(secure)
        .build()
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
