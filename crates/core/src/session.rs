//! Session cookie names and the cookie header parser.
//!
//! The portal keeps its whole session in a handful of plain cookies. Every
//! server route reads them through [`SessionCookies::parse`], which walks the
//! `Cookie` header once and returns every field the routes care about.

use std::borrow::Cow;

/// Cookie names written by the login flow and read by the API routes.
pub mod names {
    /// CRM user id, readable by browser code.
    pub const USER_ID: &str = "userId";
    /// WordPress user id of the same patient.
    pub const WP_USER_ID: &str = "wp_user_id";
    /// Email of the logged-in patient.
    pub const USER_EMAIL: &str = "userEmail";
    /// Bearer token for the CRM (`HttpOnly`).
    pub const AUTH_TOKEN: &str = "authToken";
    /// Bearer token copy readable by browser code. Takes priority over `authToken`.
    pub const TOKEN: &str = "token";
    /// WooCommerce Store API nonce.
    pub const CART_NONCE: &str = "cart-nonce";

    /// Every cookie that belongs to the login session (the cart nonce does not).
    pub const SESSION: [&str; 5] = [USER_ID, WP_USER_ID, USER_EMAIL, AUTH_TOKEN, TOKEN];
}

/// Session cookie lifetime (7 days).
pub const SESSION_MAX_AGE_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Cart nonce cookie lifetime (24 hours).
pub const CART_NONCE_MAX_AGE_SECONDS: i64 = 24 * 60 * 60;

/// Everything the portal stores in cookies, parsed from one header.
///
/// Empty cookie values are treated as absent, so a cookie that was cleared by
/// logout (`userId=; Max-Age=0`) but is still sent by a lagging client never
/// counts as a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    pub user_id: Option<String>,
    pub wp_user_id: Option<String>,
    /// Bearer token: `token` if present, otherwise `authToken`.
    pub auth_token: Option<String>,
    pub user_email: Option<String>,
    pub cart_nonce: Option<String>,
}

impl SessionCookies {
    /// Parse a raw `Cookie` header value.
    ///
    /// Never fails: malformed pairs are skipped. When a name repeats, the first
    /// occurrence wins (browsers send the most specific path first).
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut cookies = Self::default();
        let mut token = None;
        let mut auth_token = None;

        for pair in header.split(';') {
            let Some((name, raw_value)) = pair.split_once('=') else {
                continue;
            };

            let value = decode_value(raw_value.trim());
            if value.is_empty() {
                continue;
            }

            let slot = match name.trim() {
                names::USER_ID => &mut cookies.user_id,
                names::WP_USER_ID => &mut cookies.wp_user_id,
                names::USER_EMAIL => &mut cookies.user_email,
                names::CART_NONCE => &mut cookies.cart_nonce,
                names::TOKEN => &mut token,
                names::AUTH_TOKEN => &mut auth_token,
                _ => continue,
            };

            if slot.is_none() {
                *slot = Some(value);
            }
        }

        cookies.auth_token = token.or(auth_token);
        cookies
    }

    /// Parse several `Cookie` headers (HTTP/2 clients may split them).
    #[must_use]
    pub fn parse_all<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let joined = headers.into_iter().collect::<Vec<_>>().join("; ");
        Self::parse(&joined)
    }

    /// Whether a bearer token is available for CRM calls.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.auth_token.is_some()
    }
}

/// Extract the bearer token from a raw `Cookie` header.
///
/// Checks `token` first, then `authToken`. Returns `None` when the header is
/// absent or carries neither cookie.
#[must_use]
pub fn extract_token(header: Option<&str>) -> Option<String> {
    header.and_then(|h| SessionCookies::parse(h).auth_token)
}

fn decode_value(raw: &str) -> String {
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(raw);

    urlencoding::decode(unquoted).map_or_else(|_| unquoted.to_string(), Cow::into_owned)
}
