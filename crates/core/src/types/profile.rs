//! Profile fields that may be updated through a multipart upload.

use core::fmt;
use std::str::FromStr;

/// Error returned for a field name outside the upload allow-list.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("field '{0}' cannot be updated; allowed fields are phone_number, photo_id, insurance_card_image")]
pub struct ProfileFieldError(pub String);

/// A profile field accepted by the multipart profile update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    PhoneNumber,
    PhotoId,
    InsuranceCardImage,
}

impl ProfileField {
    /// Every field in the allow-list.
    pub const ALL: [Self; 3] = [Self::PhoneNumber, Self::PhotoId, Self::InsuranceCardImage];

    /// The form field name the CRM expects.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PhoneNumber => "phone_number",
            Self::PhotoId => "photo_id",
            Self::InsuranceCardImage => "insurance_card_image",
        }
    }

    /// Whether the field carries a file rather than text.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::PhotoId | Self::InsuranceCardImage)
    }
}

impl FromStr for ProfileField {
    type Err = ProfileFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| ProfileFieldError(s.to_owned()))
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
