#![forbid(unsafe_code)]

//! SHA-256 certificate fingerprints.

use base64::Engine;
use samlmeta_core::Error;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// A SHA-256 fingerprint held as 64 lowercase hex digits.
///
/// Parsing accepts the usual operator spellings: octets separated by `:`
/// or spaces, in either case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a fingerprint, treating an empty value as "not configured".
    pub fn parse_optional(text: &str) -> Result<Option<Self>, Error> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Ok(None);
        }
        if normalized.len() != 64 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidConfig(format!(
                "fingerprint must be a SHA-256 digest (64 hex digits), got {} characters",
                normalized.len()
            )));
        }
        Ok(Some(Self(normalized)))
    }

    /// Fingerprint of a DER-encoded certificate.
    pub fn of_der(der: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(der)))
    }

    /// Fingerprint of a base64 DER certificate as it appears in metadata.
    pub fn of_base64(text: &str) -> Result<Self, Error> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(crate::cert::normalize_base64(text))
            .map_err(|e| Error::Base64(format!("certificate: {e}")))?;
        Ok(Self::of_der(&der))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison with another fingerprint.
    pub fn ct_matches(&self, other: &Fingerprint) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }

    /// Whether `der` hashes to this fingerprint.
    pub fn matches_der(&self, der: &[u8]) -> bool {
        self.ct_matches(&Self::of_der(der))
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_optional(s)?
            .ok_or_else(|| Error::InvalidConfig("fingerprint is empty".into()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
