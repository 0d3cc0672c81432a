//! Numeric id newtypes.
//!
//! CRM and WooCommerce ids are positive integers, but they reach the portal
//! as JSON numbers, JSON strings, path segments and cookie values. The
//! `define_id!` macro produces wrappers that accept all of those and reject
//! anything that is not a positive integer.

use serde::{Deserialize, Deserializer, de::Error as _};

/// Errors that can occur when parsing an id.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input is empty.
    #[error("id cannot be empty")]
    Empty,
    /// The input is not a positive integer.
    #[error("id must be a positive integer, got '{0}'")]
    NotNumeric(String),
}

/// Parse a positive integer id from text.
///
/// # Errors
///
/// Returns an error if the trimmed input is empty, contains anything other
/// than ASCII digits, overflows `u64`, or is zero.
pub fn parse_numeric_id(s: &str) -> Result<u64, IdError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdError::NotNumeric(trimmed.to_owned()));
    }
    match trimmed.parse::<u64>() {
        Ok(0) | Err(_) => Err(IdError::NotNumeric(trimmed.to_owned())),
        Ok(id) => Ok(id),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

#[doc(hidden)]
pub fn deserialize_numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Number(0) => Err(D::Error::custom(IdError::NotNumeric("0".to_owned()))),
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => parse_numeric_id(&text).map_err(D::Error::custom),
    }
}

/// Macro to define a numeric id wrapper.
///
/// Creates a newtype around `u64` with:
/// - `Serialize` as a bare number, `Deserialize` from a number or digit string
/// - `FromStr` for path segments and cookie values
/// - `Display`, `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
///
/// # Example
///
/// ```rust
/// # use patient_portal_core::define_id;
/// define_id!(ThreadId);
///
/// let id: ThreadId = "42".parse().unwrap();
/// assert_eq!(id.as_u64(), 42);
/// assert!("abc".parse::<ThreadId>().is_err());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create a new id from a raw value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::IdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                $crate::types::id::parse_numeric_id(s).map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                $crate::types::id::deserialize_numeric_id(deserializer).map(Self)
            }
        }
    };
}

define_id!(UserId);
define_id!(WpUserId);
define_id!(CrmUserId);
define_id!(OrderId);
define_id!(SubscriptionId);
define_id!(LineItemId);
define_id!(PrescriptionId);
define_id!(ProductId);
define_id!(VariationId);
