//! Calendar date carried in refill-date requests.

use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

/// Errors that can occur when parsing a [`RefillDate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    /// The input is not shaped like `YYYY-MM-DD`.
    #[error("date must use the YYYY-MM-DD format")]
    Format,
    /// The input is shaped correctly but names a day that does not exist.
    #[error("'{0}' is not a valid calendar date")]
    Invalid(String),
}

/// A date in strict `YYYY-MM-DD` form.
///
/// Both the shape and the calendar are checked: `2025-12-27` is accepted,
/// `2025-13-01` and `2025-02-30` are rejected, and so is `2025-1-5`.
///
/// ```
/// use patient_portal_core::RefillDate;
///
/// assert!(RefillDate::parse("2025-12-27").is_ok());
/// assert!(RefillDate::parse("2025-13-01").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefillDate(NaiveDate);

impl RefillDate {
    /// Parse a strict `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::Format`] when the shape is wrong and
    /// [`DateError::Invalid`] when the month or day is out of range.
    pub fn parse(s: &str) -> Result<Self, DateError> {
        let shape_ok = s.len() == 10
            && s.bytes().enumerate().all(|(i, b)| match i {
                4 | 7 => b == b'-',
                _ => b.is_ascii_digit(),
            });
        if !shape_ok {
            return Err(DateError::Format);
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| DateError::Invalid(s.to_owned()))
    }

    /// Returns the underlying date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for RefillDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl std::str::FromStr for RefillDate {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RefillDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RefillDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_date() {
        let date = RefillDate::parse("2025-12-27").unwrap();
        assert_eq!(date.to_string(), "2025-12-27");
    }

    #[test]
    fn test_invalid_month() {
        assert_eq!(
            RefillDate::parse("2025-13-01"),
            Err(DateError::Invalid("2025-13-01".to_string()))
        );
    }

    #[test]
    fn test_invalid_day() {
        assert!(matches!(
            RefillDate::parse("2025-02-30"),
            Err(DateError::Invalid(_))
        ));
        assert!(RefillDate::parse("2024-02-29").is_ok());
    }

    #[test]
    fn test_wrong_shape() {
        for input in ["2025-1-05", "27/12/2025", "2025-12-27T00:00:00", "", "abcd-ef-gh"] {
            assert_eq!(RefillDate::parse(input), Err(DateError::Format), "{input}");
        }
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: RefillDate = serde_json::from_str("\"2026-01-15\"").unwrap();
        assert_eq!(ok.to_string(), "2026-01-15");
        assert!(serde_json::from_str::<RefillDate>("\"2026-00-15\"").is_err());
        assert!(serde_json::from_str::<RefillDate>("20260115").is_err());
    }
}
