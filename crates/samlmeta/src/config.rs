#![forbid(unsafe_code)]

//! Trust configuration supplied once per cycle.
//!
//! A fingerprint pins exactly one thing, chosen by [`PinTarget`]:
//!
//! - [`PinTarget::SigningCertificate`] (default): the SHA-256 of the first
//!   signing certificate embedded in the metadata. The metadata must then
//!   carry a valid enveloped signature made with that certificate.
//! - [`PinTarget::TlsEndpoint`]: the SHA-256 of the TLS leaf certificate
//!   served by the metadata host. Requires an `https` metadata URL.

use samlmeta_core::{Error, Result};
use samlmeta_crypto::Fingerprint;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// What a configured fingerprint is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinTarget {
    #[default]
    SigningCertificate,
    TlsEndpoint,
}

impl FromStr for PinTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "signing" => Ok(Self::SigningCertificate),
            "tls" => Ok(Self::TlsEndpoint),
            other => Err(Error::InvalidConfig(format!(
                "unknown pin target {other:?} (expected signing or tls)"
            ))),
        }
    }
}

impl fmt::Display for PinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SigningCertificate => "signing",
            Self::TlsEndpoint => "tls",
        })
    }
}

/// Validated inputs for one verification cycle.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    entity_id: String,
    metadata_url: String,
    parsed_url: Url,
    fingerprint: Option<Fingerprint>,
    pin_target: PinTarget,
}

impl TrustConfig {
    /// Validate `entity_id` and `metadata_url`.
    ///
    /// All invalid fields are reported in one error, e.g.
    /// `invalid configuration: entity_id metadata_url`.
    pub fn new(entity_id: &str, metadata_url: &str) -> Result<Self> {
        let mut invalid = Vec::new();
        if entity_id.is_empty() {
            invalid.push("entity_id");
        }
        let parsed_url = match parse_http_url(metadata_url) {
            Some(url) => Some(url),
            None => {
                invalid.push("metadata_url");
                None
            }
        };
        match parsed_url {
            Some(parsed_url) if invalid.is_empty() => Ok(Self {
                entity_id: entity_id.to_owned(),
                metadata_url: metadata_url.to_owned(),
                parsed_url,
                fingerprint: None,
                pin_target: PinTarget::default(),
            }),
            _ => Err(Error::InvalidConfig(invalid.join(" "))),
        }
    }

    /// Pin a SHA-256 fingerprint; an empty string leaves pinning off.
    ///
    /// `:` and whitespace separators are ignored and case is folded.
    pub fn with_fingerprint(mut self, fingerprint: &str) -> Result<Self> {
        self.fingerprint = Fingerprint::parse_optional(fingerprint)?;
        Ok(self)
    }

    pub fn with_pin_target(mut self, pin_target: PinTarget) -> Result<Self> {
        if pin_target == PinTarget::TlsEndpoint && self.parsed_url.scheme() != "https" {
            return Err(Error::InvalidConfig(
                "pinning the TLS endpoint requires an https metadata_url".into(),
            ));
        }
        self.pin_target = pin_target;
        Ok(self)
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The metadata URL exactly as configured.
    pub fn metadata_url(&self) -> &str {
        &self.metadata_url
    }

    pub fn metadata_host(&self) -> Option<&str> {
        self.parsed_url.host_str()
    }

    pub fn metadata_port(&self) -> Option<u16> {
        self.parsed_url.port_or_known_default()
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn pin_target(&self) -> PinTarget {
        self.pin_target
    }

    /// Fingerprint compared against the embedded signing certificate, if any.
    pub fn signing_fingerprint(&self) -> Option<&Fingerprint> {
        match self.pin_target {
            PinTarget::SigningCertificate => self.fingerprint.as_ref(),
            PinTarget::TlsEndpoint => None,
        }
    }

    /// Fingerprint compared against the metadata host's TLS certificate, if any.
    pub fn tls_fingerprint(&self) -> Option<&Fingerprint> {
        match self.pin_target {
            PinTarget::TlsEndpoint => self.fingerprint.as_ref(),
            PinTarget::SigningCertificate => None,
        }
    }
}

fn parse_http_url(text: &str) -> Option<Url> {
    let url = Url::parse(text).ok()?;
    let http = matches!(url.scheme(), "http" | "https");
    (http && url.host_str().is_some_and(|h| !h.is_empty())).then_some(url)
}
