#![forbid(unsafe_code)]

//! Cryptographic primitives for verifying SAML metadata.
//!
//! Provides reference digests and signature verification selected by
//! XML-DSig algorithm URI, X.509 certificate decoding, and SHA-256
//! certificate fingerprints with constant-time comparison.

pub mod cert;
pub mod digest;
pub mod fingerprint;
pub mod sign;

pub use cert::X509Certificate;
pub use digest::DigestMethod;
pub use fingerprint::Fingerprint;
pub use sign::{RsaHash, SignatureMethod, VerifyingKey};
