//! Patient portal client library.
//!
//! Keeps track of a portal login from outside the browser: a cookie-aware
//! HTTP client plus a persistent store standing in for browser storage.
//!
//! # Modules
//!
//! - [`session`] - [`SessionContext`]: login, logout and session re-validation
//! - [`store`] - [`SessionStore`] with in-memory and JSON file backends
//! - [`error`] - Client error types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod error;
pub mod session;
pub mod store;

pub use error::{SessionError, StoreError};
pub use session::SessionContext;
pub use store::{FileStore, MemoryStore, SessionStore, StoredSession};
