#![forbid(unsafe_code)]

//! Error taxonomy for metadata acquisition and trust verification.
//!
//! The first six variants are the user-visible failure classes. The rest
//! come out of the XML-DSig engine and are folded into
//! [`Error::SignatureMismatch`] by the trust gate.

/// The certificate a configured fingerprint was compared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pinned {
    /// The metadata's embedded signing certificate.
    SigningCertificate,
    /// The leaf certificate served by the metadata host.
    TlsCertificate,
}

impl std::fmt::Display for Pinned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SigningCertificate => "signature",
            Self::TlsCertificate => "TLS certificate",
        })
    }
}

/// Errors produced while fetching, verifying or extracting IdP metadata.
///
/// `Clone` so a memoized failure can be handed out on every access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("error while retrieving data from {url}: {reason}")]
    NetworkFailure { url: String, reason: String },

    #[error("metadata can't be parsed: {0}")]
    MalformedDocument(String),

    #[error("{pinned} does not match provided fingerprint: {reason}")]
    FingerprintMismatch { pinned: Pinned, reason: String },

    #[error("the metadata has an invalid signature: {0}")]
    SignatureMismatch(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("invalid query: {0}")]
    Query(String),
}

impl Error {
    /// Whether this error belongs to the signature engine rather than to one
    /// of the user-visible classes.
    pub fn is_dsig_internal(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedAlgorithm(_)
                | Error::MissingElement(_)
                | Error::MissingAttribute(_)
                | Error::InvalidUri(_)
                | Error::Canonicalization(_)
                | Error::Crypto(_)
                | Error::Certificate(_)
                | Error::Base64(_)
                | Error::Query(_)
        )
    }

    /// Human-readable reason reported to the operator as
    /// "configuration invalid".
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failure_names_the_url() {
        let err = Error::NetworkFailure {
            url: "https://idp.example/meta".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.reason(),
            "error while retrieving data from https://idp.example/meta: connection refused"
        );
    }

    #[test]
    fn fingerprint_mismatch_names_the_pinned_certificate() {
        let signing = Error::FingerprintMismatch {
            pinned: Pinned::SigningCertificate,
            reason: "no signing certificate in metadata".into(),
        };
        assert_eq!(
            signing.reason(),
            "signature does not match provided fingerprint: no signing certificate in metadata"
        );
        let tls = Error::FingerprintMismatch {
            pinned: Pinned::TlsCertificate,
            reason: "idp.example:443 served another certificate".into(),
        };
        assert!(tls
            .reason()
            .starts_with("TLS certificate does not match provided fingerprint"));
    }

    #[test]
    fn engine_errors_are_internal() {
        assert!(Error::Crypto("x".into()).is_dsig_internal());
        assert!(Error::InvalidUri("#x".into()).is_dsig_internal());
        assert!(!Error::SignatureMismatch("x".into()).is_dsig_internal());
        assert!(!Error::Timeout("x".into()).is_dsig_internal());
    }
}
