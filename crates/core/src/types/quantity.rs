//! Positive item quantity.

use std::num::NonZeroU32;

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;

/// Errors that can occur when reading a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The field is absent or `null`.
    #[error("quantity is required")]
    Missing,
    /// The field is present but is not a positive integer.
    #[error("quantity must be a positive integer")]
    NotPositiveInteger,
}

/// A positive integer quantity.
///
/// Only JSON integers are accepted. Strings (even `"2"`), floats, zero and
/// negative numbers are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// Create a quantity from a raw count.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::NotPositiveInteger`] for zero.
    pub fn new(count: u32) -> Result<Self, QuantityError> {
        NonZeroU32::new(count)
            .map(Self)
            .ok_or(QuantityError::NotPositiveInteger)
    }

    /// Validate a quantity taken from a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error unless the value is a JSON integer in `1..=u32::MAX`.
    pub fn from_json(value: Option<&Value>) -> Result<Self, QuantityError> {
        match value {
            None | Some(Value::Null) => Err(QuantityError::Missing),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(QuantityError::NotPositiveInteger)
                .and_then(Self::new),
            Some(_) => Err(QuantityError::NotPositiveInteger),
        }
    }

    /// Returns the count.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0.get()
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(Some(&value)).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_accepts_positive_integer() {
        assert_eq!(Quantity::from_json(Some(&json!(2))).unwrap().get(), 2);
    }

    #[test]
    fn test_rejects_zero_and_negative() {
        assert_eq!(
            Quantity::from_json(Some(&json!(0))),
            Err(QuantityError::NotPositiveInteger)
        );
        assert_eq!(
            Quantity::from_json(Some(&json!(-1))),
            Err(QuantityError::NotPositiveInteger)
        );
    }

    #[test]
    fn test_rejects_strings_and_floats() {
        assert!(Quantity::from_json(Some(&json!("abc"))).is_err());
        assert!(Quantity::from_json(Some(&json!("2"))).is_err());
        assert!(Quantity::from_json(Some(&json!(1.5))).is_err());
    }

    #[test]
    fn test_missing() {
        assert_eq!(Quantity::from_json(None), Err(QuantityError::Missing));
        assert_eq!(
            Quantity::from_json(Some(&Value::Null)),
            Err(QuantityError::Missing)
        );
    }
}
