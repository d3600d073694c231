#![forbid(unsafe_code)]

//! One metadata fetch cycle and its trust gate.
//!
//! A cycle fetches the document at most once and parses it once. That
//! single parse reads everything later accessors need: the signing
//! certificate, signature presence and validity, and the configured
//! entity's certificates and endpoints. Results are memoized, failures
//! included, so a broken fetch or a rejected signature is reported on every
//! access. A new fetch means a new cycle; see [`MetadataCycle::refresh`].
//!
//! Trust rules, applied by [`MetadataCycle::trusted_document`]:
//!
//! 1. With [`PinTarget::TlsEndpoint`] and a fingerprint, the metadata
//!    host's TLS leaf certificate must match before anything is fetched.
//! 2. With [`PinTarget::SigningCertificate`] and a fingerprint, the first
//!    signing certificate must exist and match.
//! 3. When a signing certificate and a `ds:Signature` are both present, the
//!    signature must verify with that certificate and cover the document.
//! 4. A pinned signing certificate without a signature is rejected.
//!
//! [`PinTarget::TlsEndpoint`]: crate::PinTarget::TlsEndpoint
//! [`PinTarget::SigningCertificate`]: crate::PinTarget::SigningCertificate

use crate::config::TrustConfig;
use crate::extract::{self, CertificateSet, Endpoint};
use crate::relation::SamlRelationData;
use samlmeta_core::{Error, Pinned, Result};
use samlmeta_crypto::{Fingerprint, X509Certificate};
use samlmeta_dsig::VerifyResult;
use samlmeta_net::{CertificateProbe, HttpFetcher, MetadataSource, TlsProbe};
use samlmeta_xml::MetadataDocument;
use std::cell::OnceCell;
use std::time::Duration;

/// What the trust gate established about the document.
#[derive(Debug, Clone)]
struct Trust {
    /// Signing certificate whose signature over the document verified.
    verified_signer: Option<String>,
}

/// The fetched document and what was read from its parse.
#[derive(Debug)]
struct Snapshot {
    document: MetadataDocument,
    facts: Facts,
}

#[derive(Debug)]
struct Facts {
    signing_certificate: Option<String>,
    signature_present: bool,
    /// Set when both a signing certificate and a signature exist.
    signature_check: Option<Result<()>>,
    entity_certificates: Vec<String>,
    endpoints: Result<Vec<Endpoint>>,
}

impl Facts {
    fn read(tree: &roxmltree::Document<'_>, entity_id: &str) -> Result<Self> {
        let signing_certificate = extract::signing_certificate(tree)?;
        let signature_present = extract::has_signature(tree)?;
        let signature_check = match &signing_certificate {
            Some(cert) if signature_present => Some(check_signature(tree, cert)),
            _ => None,
        };
        Ok(Self {
            signing_certificate,
            signature_present,
            signature_check,
            entity_certificates: extract::entity_certificates(tree, entity_id)?,
            endpoints: extract::endpoints(tree, entity_id),
        })
    }
}

/// One fetch of an IdP's metadata and everything derived from it.
///
/// Single-owner and single-threaded. Derived values are computed on first
/// access and kept until the cycle is dropped or refreshed.
pub struct MetadataCycle {
    config: TrustConfig,
    source: Box<dyn MetadataSource>,
    probe: Box<dyn CertificateProbe>,
    snapshot: OnceCell<Result<Snapshot>>,
    trust: OnceCell<Result<Trust>>,
    certificates: OnceCell<Result<CertificateSet>>,
}

impl MetadataCycle {
    pub fn new(
        config: TrustConfig,
        source: Box<dyn MetadataSource>,
        probe: Box<dyn CertificateProbe>,
    ) -> Self {
        Self {
            config,
            source,
            probe,
            snapshot: OnceCell::new(),
            trust: OnceCell::new(),
            certificates: OnceCell::new(),
        }
    }

    /// A cycle that fetches over HTTP(S) and probes the metadata host.
    pub fn over_http(config: TrustConfig, timeout: Duration) -> Result<Self> {
        let fetcher = HttpFetcher::new(timeout)?;
        let mut probe = TlsProbe::new();
        if let Some(port) = config.metadata_port() {
            probe = probe.port(port);
        }
        Ok(Self::new(config, Box::new(fetcher), Box::new(probe)))
    }

    /// Discard everything derived so far and start a new cycle.
    pub fn refresh(self) -> Self {
        Self::new(self.config, self.source, self.probe)
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// The parsed document, before any trust decision.
    pub fn document(&self) -> Result<&MetadataDocument> {
        self.snapshot().map(|snapshot| &snapshot.document)
    }

    /// First `KeyDescriptor[@use='signing']` certificate, whitespace removed.
    pub fn signing_certificate(&self) -> Result<Option<&str>> {
        self.snapshot().map(|snapshot| snapshot.facts.signing_certificate.as_deref())
    }

    /// Whether the document carries a `ds:Signature`.
    pub fn signature_present(&self) -> Result<bool> {
        self.snapshot().map(|snapshot| snapshot.facts.signature_present)
    }

    /// The document, once the trust gate has accepted it.
    pub fn trusted_document(&self) -> Result<&MetadataDocument> {
        self.trust()?;
        self.document()
    }

    /// Whether the document's signature was verified.
    pub fn is_signed(&self) -> Result<bool> {
        Ok(self.trust()?.verified_signer.is_some())
    }

    /// Certificates of the configured entity, arranged by the trust outcome.
    pub fn certificates(&self) -> Result<&CertificateSet> {
        memoized(&self.certificates, || {
            let trust = self.trust()?;
            let found = self.snapshot()?.facts.entity_certificates.clone();
            Ok(extract::arrange_certificates(
                found,
                trust.verified_signer.as_deref(),
            ))
        })
    }

    /// Endpoints of the configured entity, as a fresh list on every call.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.trust()?;
        self.snapshot()?.facts.endpoints.clone()
    }

    pub fn relation_data(&self) -> Result<SamlRelationData> {
        Ok(SamlRelationData {
            entity_id: self.config.entity_id().to_owned(),
            metadata_url: self.config.metadata_url().to_owned(),
            certificates: self.certificates()?.to_vec(),
            endpoints: self.endpoints()?,
        })
    }

    fn snapshot(&self) -> Result<&Snapshot> {
        memoized(&self.snapshot, || {
            let url = self.config.metadata_url();
            let entity_id = self.config.entity_id();
            let bytes = self.source.fetch(url)?;
            let (document, facts) =
                MetadataDocument::parse_bytes_with(&bytes, |tree| Facts::read(tree, entity_id))
                    .inspect_err(|e| {
                        tracing::warn!(%url, error = %e, "metadata can't be read");
                    })?;
            tracing::debug!(
                %url,
                signature = facts.signature_present,
                certificates = facts.entity_certificates.len(),
                "metadata read"
            );
            Ok(Snapshot { document, facts })
        })
    }

    fn trust(&self) -> Result<&Trust> {
        memoized(&self.trust, || {
            let url = self.config.metadata_url();
            let entity_id = self.config.entity_id();
            self.evaluate_trust()
                .inspect(|trust| {
                    tracing::info!(
                        %url,
                        %entity_id,
                        signed = trust.verified_signer.is_some(),
                        "metadata accepted"
                    );
                })
                .inspect_err(|e| {
                    tracing::warn!(%url, %entity_id, error = %e, "metadata rejected");
                })
        })
    }

    fn evaluate_trust(&self) -> Result<Trust> {
        if let Some(expected) = self.config.tls_fingerprint() {
            self.check_tls_pin(expected)?;
        }

        let facts = &self.snapshot()?.facts;
        let signing_cert = facts.signing_certificate.as_deref();

        if let Some(expected) = self.config.signing_fingerprint() {
            let mismatch = |reason: String| Error::FingerprintMismatch {
                pinned: Pinned::SigningCertificate,
                reason,
            };
            let cert =
                signing_cert.ok_or_else(|| mismatch("no signing certificate in metadata".into()))?;
            let actual = Fingerprint::of_base64(cert).map_err(|e| mismatch(e.reason()))?;
            if !expected.ct_matches(&actual) {
                return Err(mismatch(format!(
                    "signing certificate has fingerprint {actual}"
                )));
            }
        }

        match (signing_cert, &facts.signature_check) {
            (Some(cert), Some(check)) => {
                check.clone()?;
                Ok(Trust {
                    verified_signer: Some(cert.to_owned()),
                })
            }
            (Some(_), None) if self.config.signing_fingerprint().is_some() => {
                Err(Error::SignatureMismatch(
                    "a fingerprint is configured but the metadata is not signed".into(),
                ))
            }
            _ => Ok(Trust {
                verified_signer: None,
            }),
        }
    }

    fn check_tls_pin(&self, expected: &Fingerprint) -> Result<()> {
        let host = self
            .config
            .metadata_host()
            .ok_or_else(|| Error::InvalidConfig("metadata_url has no host".into()))?;
        if self.probe.verify_fingerprint(host, expected.as_hex())? {
            Ok(())
        } else {
            Err(Error::FingerprintMismatch {
                pinned: Pinned::TlsCertificate,
                reason: format!("{host} served another certificate"),
            })
        }
    }
}

impl std::fmt::Debug for MetadataCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCycle")
            .field("config", &self.config)
            .field("fetched", &self.snapshot.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Verify the enveloped signature with the embedded signing certificate.
///
/// Every failure, including unprocessable signatures, is a
/// `SignatureMismatch`.
fn check_signature(tree: &roxmltree::Document<'_>, cert_b64: &str) -> Result<()> {
    let cert = X509Certificate::from_base64(cert_b64)
        .map_err(|e| Error::SignatureMismatch(e.reason()))?;
    tracing::debug!(subject = %cert.subject(), "verifying metadata signature");
    match samlmeta_dsig::verify(tree, &cert) {
        Ok(VerifyResult::Valid) => Ok(()),
        Ok(VerifyResult::Invalid { reason }) => Err(Error::SignatureMismatch(reason)),
        Err(e) if e.is_dsig_internal() => Err(Error::SignatureMismatch(e.reason())),
        Err(e) => Err(e),
    }
}

fn memoized<'a, T>(
    cell: &'a OnceCell<Result<T>>,
    init: impl FnOnce() -> Result<T>,
) -> Result<&'a T> {
    cell.get_or_init(init).as_ref().map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PinTarget;
    use crate::source::InMemorySource;
    use std::cell::Cell;
    use std::rc::Rc;

    const ENTITY_ID: &str = "https://idp.example/meta";
    const METADATA_URL: &str = "https://idp.example/saml/metadata";

    const UNSIGNED: &str = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="https://idp.example/meta">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo><ds:X509Data><ds:X509Certificate>Q0VSVA==</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
    </md:KeyDescriptor>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;

    struct CountingSource {
        result: Result<Vec<u8>>,
        fetches: Rc<Cell<usize>>,
    }

    impl MetadataSource for CountingSource {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            self.fetches.set(self.fetches.get() + 1);
            self.result.clone()
        }
    }

    struct FixedProbe {
        answer: Result<bool>,
        probes: Rc<Cell<usize>>,
    }

    impl CertificateProbe for FixedProbe {
        fn verify_fingerprint(&self, _host: &str, _expected: &str) -> Result<bool> {
            self.probes.set(self.probes.get() + 1);
            self.answer.clone()
        }
    }

    fn config() -> TrustConfig {
        TrustConfig::new(ENTITY_ID, METADATA_URL).unwrap()
    }

    fn no_tls_access() -> Box<dyn CertificateProbe> {
        Box::new(FixedProbe {
            answer: Err(Error::Timeout("probe must not run".into())),
            probes: Rc::default(),
        })
    }

    fn counting(result: Result<Vec<u8>>) -> (Box<dyn MetadataSource>, Rc<Cell<usize>>) {
        let fetches = Rc::new(Cell::new(0));
        let source = CountingSource {
            result,
            fetches: Rc::clone(&fetches),
        };
        (Box::new(source), fetches)
    }

    fn cycle(config: TrustConfig, xml: &str) -> MetadataCycle {
        MetadataCycle::new(config, Box::new(InMemorySource::new(xml)), no_tls_access())
    }

    #[test]
    fn fetches_once_per_cycle() {
        let (source, fetches) = counting(Ok(UNSIGNED.as_bytes().to_vec()));
        let cycle = MetadataCycle::new(config(), source, no_tls_access());

        cycle.signing_certificate().unwrap();
        cycle.signature_present().unwrap();
        cycle.certificates().unwrap();
        cycle.endpoints().unwrap();
        cycle.endpoints().unwrap();
        cycle.relation_data().unwrap();
        assert_eq!(fetches.get(), 1);

        let cycle = cycle.refresh();
        cycle.endpoints().unwrap();
        assert_eq!(fetches.get(), 2);
    }

    #[test]
    fn malformed_document_fails_every_access() {
        let (source, fetches) = counting(Ok(b"invalid".to_vec()));
        let cycle = MetadataCycle::new(config(), source, no_tls_access());
        for _ in 0..3 {
            assert!(matches!(cycle.certificates(), Err(Error::MalformedDocument(_))));
            assert!(matches!(cycle.endpoints(), Err(Error::MalformedDocument(_))));
            assert!(matches!(cycle.signing_certificate(), Err(Error::MalformedDocument(_))));
        }
        assert_eq!(fetches.get(), 1);
    }

    #[test]
    fn network_failure_fails_every_access() {
        let failure = Error::NetworkFailure {
            url: METADATA_URL.into(),
            reason: "connection refused".into(),
        };
        let (source, fetches) = counting(Err(failure.clone()));
        let cycle = MetadataCycle::new(config(), source, no_tls_access());
        assert_eq!(cycle.endpoints().unwrap_err(), failure);
        assert_eq!(cycle.certificates().unwrap_err(), failure);
        assert_eq!(cycle.relation_data().unwrap_err(), failure);
        assert_eq!(fetches.get(), 1);
    }

    #[test]
    fn unsigned_metadata_without_fingerprint_is_accepted() {
        let cycle = cycle(config(), UNSIGNED);
        assert!(!cycle.is_signed().unwrap());
        assert_eq!(
            cycle.certificates().unwrap(),
            &CertificateSet::Unordered(["Q0VSVA==".to_owned()].into())
        );
        let endpoints = cycle.endpoints().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].response_url, None);
    }

    #[test]
    fn pinned_but_unsigned_metadata_fails_closed() {
        let fingerprint = Fingerprint::of_der(b"CERT");
        let config = config().with_fingerprint(fingerprint.as_hex()).unwrap();
        let cycle = cycle(config, UNSIGNED);
        assert!(matches!(cycle.trusted_document(), Err(Error::SignatureMismatch(_))));
        assert!(matches!(cycle.endpoints(), Err(Error::SignatureMismatch(_))));
    }

    #[test]
    fn fingerprint_mismatch_is_rejected() {
        let fingerprint = Fingerprint::of_der(b"OTHER");
        let config = config().with_fingerprint(fingerprint.as_hex()).unwrap();
        let cycle = cycle(config, UNSIGNED);
        assert!(matches!(cycle.certificates(), Err(Error::FingerprintMismatch { .. })));
    }

    #[test]
    fn fingerprint_without_signing_certificate_is_rejected() {
        let xml = UNSIGNED.replace(r#"use="signing""#, r#"use="encryption""#);
        let fingerprint = Fingerprint::of_der(b"CERT");
        let config = config().with_fingerprint(fingerprint.as_hex()).unwrap();
        let cycle = cycle(config, &xml);
        let err = cycle.endpoints().unwrap_err();
        assert!(matches!(err, Error::FingerprintMismatch { .. }));
        assert!(err.to_string().starts_with("signature does not match provided fingerprint"));
    }

    #[test]
    fn tls_pin_is_checked_before_fetching() {
        let (source, fetches) = counting(Ok(UNSIGNED.as_bytes().to_vec()));
        let probes = Rc::new(Cell::new(0));
        let probe = FixedProbe {
            answer: Ok(false),
            probes: Rc::clone(&probes),
        };
        let config = config()
            .with_fingerprint(Fingerprint::of_der(b"CERT").as_hex())
            .unwrap()
            .with_pin_target(PinTarget::TlsEndpoint)
            .unwrap();
        let cycle = MetadataCycle::new(config, source, Box::new(probe));
        let err = cycle.endpoints().unwrap_err();
        assert!(matches!(
            err,
            Error::FingerprintMismatch {
                pinned: Pinned::TlsCertificate,
                ..
            }
        ));
        assert!(err
            .reason()
            .starts_with("TLS certificate does not match provided fingerprint"));
        assert!(matches!(cycle.certificates(), Err(Error::FingerprintMismatch { .. })));
        assert_eq!(probes.get(), 1);
        assert_eq!(fetches.get(), 0);
    }

    #[test]
    fn tls_probe_timeout_is_a_failure() {
        let probe = FixedProbe {
            answer: Err(Error::Timeout("idp.example:443".into())),
            probes: Rc::default(),
        };
        let config = config()
            .with_fingerprint(Fingerprint::of_der(b"CERT").as_hex())
            .unwrap()
            .with_pin_target(PinTarget::TlsEndpoint)
            .unwrap();
        let source = Box::new(InMemorySource::new(UNSIGNED));
        let cycle = MetadataCycle::new(config, source, Box::new(probe));
        assert!(matches!(cycle.trusted_document(), Err(Error::Timeout(_))));
    }

    #[test]
    fn tls_pin_does_not_require_signature() {
        let probe = FixedProbe {
            answer: Ok(true),
            probes: Rc::default(),
        };
        let config = config()
            .with_fingerprint(Fingerprint::of_der(b"OTHER").as_hex())
            .unwrap()
            .with_pin_target(PinTarget::TlsEndpoint)
            .unwrap();
        let source = Box::new(InMemorySource::new(UNSIGNED));
        let cycle = MetadataCycle::new(config, source, Box::new(probe));
        assert!(cycle.trusted_document().is_ok());
        assert!(!cycle.is_signed().unwrap());
    }

    #[test]
    fn unknown_entity_yields_empty_results() {
        let config = TrustConfig::new("https://nobody.example", METADATA_URL).unwrap();
        let cycle = cycle(config, UNSIGNED);
        assert!(cycle.certificates().unwrap().is_empty());
        assert!(cycle.endpoints().unwrap().is_empty());
    }
}
