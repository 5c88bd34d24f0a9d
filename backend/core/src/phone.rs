//! # Phone Normalization
//!
//! Contacts are stored with whatever the user typed: spaces, a trunk zero, the
//! country code with or without `+`. The SMS provider only accepts E.164, so every
//! number goes through [`PhoneNormalizer::normalize`] before a send.
//!
//! ## Steps
//!
//! 1. Drop all whitespace
//! 2. Drop leading zeros
//! 3. Drop a leading `+<cc>`, then a leading bare `<cc>`
//! 4. What is left must be exactly 10 ASCII digits
//! 5. Prepend `+<cc>`
//!
//! Both prefix strips always apply, so a local number that itself starts with
//! `<cc>` loses those digits and is rejected for its length.
use std::fmt;

use thiserror::Error;

pub const DEFAULT_COUNTRY_CODE: &str = "91";
pub const LOCAL_DIGITS: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    #[error("Invalid phone number format: {0} (expected {LOCAL_DIGITS} digits)")]
    InvalidFormat(String),

    #[error("Invalid country code: {0}")]
    InvalidCountryCode(String),
}

/// Channel-ready `+<cc><digits>` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAddress(String);

impl NormalizedAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
    international_prefix: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            international_prefix: format!("+{DEFAULT_COUNTRY_CODE}"),
        }
    }
}

impl PhoneNormalizer {
    /// Accepts `91` or `+91`. Calling codes are 1 to 3 digits.
    pub fn new(country_code: &str) -> Result<Self, PhoneError> {
        let code = country_code.trim().trim_start_matches('+');

        if code.is_empty() || code.len() > 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PhoneError::InvalidCountryCode(country_code.to_string()));
        }

        Ok(Self {
            country_code: code.to_string(),
            international_prefix: format!("+{code}"),
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn normalize(&self, raw: &str) -> Result<NormalizedAddress, PhoneError> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let unpadded = compact.trim_start_matches('0');

        let national = unpadded
            .strip_prefix(self.international_prefix.as_str())
            .unwrap_or(unpadded);
        let local = national
            .strip_prefix(self.country_code.as_str())
            .unwrap_or(national);

        if local.len() != LOCAL_DIGITS || !local.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PhoneError::InvalidFormat(raw.to_string()));
        }

        Ok(NormalizedAddress(format!("{}{local}", self.international_prefix)))
    }
}
