//! Phone number canonicalisation.
//!
//! Every phone number entering the system is reduced to a [`PhoneKey`] before it
//! touches a store or an external gateway. Input that does not match one of the
//! accepted shapes is rejected; nothing is passed through unnormalised.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::OtpConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("Invalid phone number format: {0}")]
    InvalidPhoneFormat(String),
}

/// Canonical international form of a phone number, e.g. `+256772207616`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneKey(String);

impl PhoneKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a value read back from a store, which only ever holds normalised keys
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PhoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
    national_length: usize,
}

impl PhoneNormalizer {
    pub fn new(country_code: impl Into<String>, national_length: usize) -> Self {
        Self {
            country_code: country_code.into().trim_start_matches('+').to_string(),
            national_length,
        }
    }

    pub fn from_config(config: &OtpConfig) -> Self {
        Self::new(config.country_code.clone(), config.national_length)
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Canonicalise country-local input.
    ///
    /// After stripping every non-digit character the accepted shapes are, in order:
    /// the bare national number (no trunk zero), the national number with a leading
    /// trunk zero, and the number already prefixed with the country code.
    pub fn normalize(&self, raw: &str) -> Result<PhoneKey, PhoneError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let n = self.national_length;

        let national = if digits.len() == n && !digits.starts_with('0') {
            &digits[..]
        } else if digits.len() == n + 1 && digits.starts_with('0') {
            &digits[1..]
        } else if digits.len() == self.country_code.len() + n && digits.starts_with(&self.country_code) {
            &digits[self.country_code.len()..]
        } else {
            return Err(PhoneError::InvalidPhoneFormat(raw.to_string()));
        };

        // A trunk zero after the country code is never a valid subscriber number
        if national.starts_with('0') {
            return Err(PhoneError::InvalidPhoneFormat(raw.to_string()));
        }

        Ok(PhoneKey(format!("+{}{}", self.country_code, national)))
    }
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::from_config(&OtpConfig::default())
    }
}
