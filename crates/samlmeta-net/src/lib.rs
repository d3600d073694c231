#![forbid(unsafe_code)]

//! Network collaborators of the metadata cycle.
//!
//! Both operations block and both enforce explicit timeouts. Neither
//! retries; the caller decides when to try again.

pub mod fetch;
pub mod probe;

pub use fetch::HttpFetcher;
pub use probe::TlsProbe;

use samlmeta_core::Result;

/// Where metadata bytes come from.
pub trait MetadataSource {
    /// Retrieve the raw metadata document at `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Compares a host's TLS leaf certificate against a pinned fingerprint.
pub trait CertificateProbe {
    /// `Ok(true)` when `expected` is empty or matches the leaf certificate.
    fn verify_fingerprint(&self, host: &str, expected: &str) -> Result<bool>;
}
