//! Core types for the patient portal.
//!
//! This module provides validated wrappers for the scalars that arrive in
//! request bodies, query strings and cookies.

pub mod cart;
pub mod date;
pub mod email;
pub mod id;
pub mod profile;
pub mod quantity;

pub use cart::CartItem;
pub use date::{DateError, RefillDate};
pub use email::{Email, EmailError};
pub use id::*;
pub use profile::{ProfileField, ProfileFieldError};
pub use quantity::{Quantity, QuantityError};
