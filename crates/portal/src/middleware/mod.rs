//! HTTP middleware stack and request extractors for the portal.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, new hub per request)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//!
//! Session state lives entirely in cookies; handlers read it through the
//! extractors in [`session`].

pub mod request_id;
pub mod session;

pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use session::{
    Authenticated, LoginSession, RequireToken, RequireUserId, Session, SessionRejection,
    SetCookies,
};
