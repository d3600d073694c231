#![forbid(unsafe_code)]

//! X.509 certificates embedded in metadata as base64 DER.

use crate::fingerprint::Fingerprint;
use crate::sign::VerifyingKey;
use base64::Engine;
use der::{Decode, Encode};
use samlmeta_core::Error;
use spki::DecodePublicKey;

const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";

/// A decoded certificate together with its normalized base64 text.
#[derive(Debug, Clone)]
pub struct X509Certificate {
    base64: String,
    der: Vec<u8>,
    cert: x509_cert::Certificate,
}

impl X509Certificate {
    /// Decode the text content of a `ds:X509Certificate` element.
    pub fn from_base64(text: &str) -> Result<Self, Error> {
        let base64 = normalize_base64(text);
        let der = base64::engine::general_purpose::STANDARD
            .decode(&base64)
            .map_err(|e| Error::Base64(format!("X509Certificate: {e}")))?;
        let cert = x509_cert::Certificate::from_der(&der)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        Ok(Self { base64, der, cert })
    }

    /// The base64 DER with all whitespace removed.
    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_der(&self.der)
    }

    pub fn subject(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    /// Extract the public key for signature verification.
    pub fn verifying_key(&self) -> Result<VerifyingKey, Error> {
        let spki = &self.cert.tbs_certificate.subject_public_key_info;
        let spki_der = spki
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
        match spki.algorithm.oid.to_string().as_str() {
            RSA_ENCRYPTION => rsa::RsaPublicKey::from_public_key_der(&spki_der)
                .map(VerifyingKey::Rsa)
                .map_err(|e| Error::Certificate(format!("invalid RSA public key: {e}"))),
            // Curve parameters are checked by each decoder.
            EC_PUBLIC_KEY => p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
                .map(VerifyingKey::EcP256)
                .or_else(|_| {
                    p384::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
                        .map(VerifyingKey::EcP384)
                })
                .map_err(|e| Error::Certificate(format!("unsupported EC public key: {e}"))),
            other => Err(Error::Certificate(format!(
                "unsupported public key algorithm: {other}"
            ))),
        }
    }
}

/// Strip the whitespace metadata publishers wrap base64 with.
pub fn normalize_base64(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
