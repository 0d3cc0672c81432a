//! Patient Portal Core - Shared types library.
//!
//! This crate provides the types shared by the portal components:
//! - `portal` - Backend-for-frontend server in front of the CRM
//! - `cli` - Client session context and command-line tools
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. Anything that validates a request field or parses a cookie header
//! lives here so both the server and the client agree on the rules.
//!
//! # Modules
//!
//! - [`session`] - Cookie names and the single-pass cookie header parser
//! - [`types`] - Newtype wrappers for ids, emails, dates, quantities and cart items

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod session;
pub mod types;

pub use session::{SessionCookies, extract_token};
pub use types::*;
