#![forbid(unsafe_code)]

//! Signature verification (RSA PKCS#1 v1.5 and ECDSA).
//!
//! Verification only. The public key always comes from the certificate
//! supplied by the caller, never from the signature's own `KeyInfo`.

use samlmeta_core::{algorithm, Error};

/// Public key material for signature verification.
#[derive(Debug, Clone)]
pub enum VerifyingKey {
    Rsa(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::VerifyingKey),
}

impl VerifyingKey {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::EcP256(_) => "EC P-256",
            Self::EcP384(_) => "EC P-384",
        }
    }
}

/// Hash used with RSA PKCS#1 v1.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaHash {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

/// A `SignatureMethod` understood by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMethod {
    RsaPkcs1v15(RsaHash),
    EcdsaP256Sha256,
    EcdsaP384Sha384,
}

impl SignatureMethod {
    /// Resolve a signature algorithm URI.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            algorithm::RSA_SHA1 => Ok(Self::RsaPkcs1v15(RsaHash::Sha1)),
            algorithm::RSA_SHA256 => Ok(Self::RsaPkcs1v15(RsaHash::Sha256)),
            algorithm::RSA_SHA384 => Ok(Self::RsaPkcs1v15(RsaHash::Sha384)),
            algorithm::RSA_SHA512 => Ok(Self::RsaPkcs1v15(RsaHash::Sha512)),
            algorithm::ECDSA_SHA256 => Ok(Self::EcdsaP256Sha256),
            algorithm::ECDSA_SHA384 => Ok(Self::EcdsaP384Sha384),
            _ => Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::RsaPkcs1v15(RsaHash::Sha1) => algorithm::RSA_SHA1,
            Self::RsaPkcs1v15(RsaHash::Sha256) => algorithm::RSA_SHA256,
            Self::RsaPkcs1v15(RsaHash::Sha384) => algorithm::RSA_SHA384,
            Self::RsaPkcs1v15(RsaHash::Sha512) => algorithm::RSA_SHA512,
            Self::EcdsaP256Sha256 => algorithm::ECDSA_SHA256,
            Self::EcdsaP384Sha384 => algorithm::ECDSA_SHA384,
        }
    }

    /// Verify `signature` over `data`.
    ///
    /// `Ok(false)` means the signature is well-formed but does not verify.
    /// A key that does not fit the algorithm is an error.
    pub fn verify(&self, key: &VerifyingKey, data: &[u8], signature: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        match (self, key) {
            (Self::RsaPkcs1v15(hash), VerifyingKey::Rsa(public_key)) => {
                let sig = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
                macro_rules! do_verify {
                    ($hasher:ty) => {{
                        let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
                        Ok(vk.verify(data, &sig).is_ok())
                    }};
                }
                match hash {
                    RsaHash::Sha1 => do_verify!(sha1::Sha1),
                    RsaHash::Sha256 => do_verify!(sha2::Sha256),
                    RsaHash::Sha384 => do_verify!(sha2::Sha384),
                    RsaHash::Sha512 => do_verify!(sha2::Sha512),
                }
            }
            (Self::EcdsaP256Sha256, VerifyingKey::EcP256(vk)) => {
                let sig = xmldsig_to_p256(signature)?;
                Ok(vk.verify(data, &sig).is_ok())
            }
            (Self::EcdsaP384Sha384, VerifyingKey::EcP384(vk)) => {
                let sig = xmldsig_to_p384(signature)?;
                Ok(vk.verify(data, &sig).is_ok())
            }
            (method, key) => Err(Error::Crypto(format!(
                "{} key cannot verify {}",
                key.kind(),
                method.uri()
            ))),
        }
    }
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!(
            "P-256 signature must be 64 bytes, got {}",
            rs.len()
        )));
    }
    p256::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!(
            "P-384 signature must be 96 bytes, got {}",
            rs.len()
        )));
    }
    p384::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

/// Convert a P-256 signature to XML-DSig r||s form.
pub fn p256_to_xmldsig(sig: &p256::ecdsa::Signature) -> Vec<u8> {
    sig.to_bytes().to_vec()
}
