//! Patient portal backend-for-frontend.
//!
//! This crate provides the portal server as a library, allowing the router
//! to be tested end to end against mocked upstreams.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod crm;
pub mod error;
pub mod messenger;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod upstream;
