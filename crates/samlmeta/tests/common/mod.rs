#![allow(dead_code)]

use base64::Engine;
use samlmeta::c14n::C14nMode;
use samlmeta::crypto::Fingerprint;
use samlmeta::dsig::sign::{self, SigningKey};

pub const ENTITY_ID: &str = "https://login.staging.ubuntu.com";
pub const METADATA_URL: &str = "https://login.staging.ubuntu.com/saml/metadata";
pub const REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";

/// A freshly generated P-256 identity.
pub struct Idp {
    pub key: SigningKey,
    pub cert_b64: String,
}

pub fn idp() -> Idp {
    let kp = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
    let cert = rcgen::CertificateParams::new(vec!["login.staging.ubuntu.com".into()])
        .unwrap()
        .self_signed(&kp)
        .unwrap();
    Idp {
        key: SigningKey::from_pkcs8_der(&kp.serialize_der()).unwrap(),
        cert_b64: base64::engine::general_purpose::STANDARD.encode(cert.der()),
    }
}

/// Fingerprint in the colon-separated upper-case form operators paste.
pub fn colon_fingerprint(cert_b64: &str) -> String {
    Fingerprint::of_base64(cert_b64)
        .unwrap()
        .as_hex()
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap().to_uppercase())
        .collect::<Vec<_>>()
        .join(":")
}

/// Wrap base64 at 64 columns the way metadata publishers do.
fn wrapped(b64: &str) -> String {
    b64.as_bytes()
        .chunks(64)
        .map(|line| std::str::from_utf8(line).unwrap())
        .collect::<Vec<_>>()
        .join("\n          ")
}

/// Staging-style metadata; `signature` is inserted as the first child.
pub fn metadata(signature: &str, signing_cert: &str, encryption_cert: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" ID="staging" entityID="{ENTITY_ID}">{signature}
  <md:IDPSSODescriptor ID="sso" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo>
        <ds:X509Data>
          <ds:X509Certificate>
          {signing}
          </ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>
    <md:KeyDescriptor use="encryption">
      <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{encryption}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
    </md:KeyDescriptor>
    <md:SingleLogoutService Binding="{REDIRECT}" Location="https://login.staging.ubuntu.com/+logout" ResponseLocation="https://login.staging.ubuntu.com/example/"/>
    <md:SingleSignOnService Binding="{REDIRECT}" Location="https://login.staging.ubuntu.com/saml/"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>
"#,
        signing = wrapped(signing_cert),
        encryption = encryption_cert,
    )
}

/// Metadata signed by `idp`, whose certificate is also the signing KeyDescriptor.
pub fn signed_metadata(idp: &Idp, encryption_cert: &str, reference_uri: &str) -> String {
    let template =
        sign::signature_template(&idp.key, C14nMode::Exclusive, reference_uri, &idp.cert_b64);
    sign::sign(&metadata(&template, &idp.cert_b64, encryption_cert), &idp.key).unwrap()
}

pub const FIRST_ENTITY_ID: &str = "https://first.example/meta";

/// A federation aggregate of two entities, signed by `signer`.
///
/// `signer`'s certificate is the first entity's signing certificate, so it
/// is also the first signing certificate of the document. The second
/// entity is [`ENTITY_ID`] and publishes `second_cert`.
pub fn signed_aggregate(signer: &Idp, second_cert: &str) -> String {
    let template = sign::signature_template(&signer.key, C14nMode::Exclusive, "", &signer.cert_b64);
    let xml = format!(
        r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" ID="federation">{template}
  <md:EntityDescriptor entityID="{FIRST_ENTITY_ID}">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
      <md:KeyDescriptor use="signing">
        <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{first}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
      </md:KeyDescriptor>
      <md:SingleSignOnService Binding="{REDIRECT}" Location="https://first.example/sso"/>
    </md:IDPSSODescriptor>
  </md:EntityDescriptor>
  <md:EntityDescriptor entityID="{ENTITY_ID}">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
      <md:KeyDescriptor use="signing">
        <ds:KeyInfo><ds:X509Data><ds:X509Certificate>{second}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
      </md:KeyDescriptor>
      <md:SingleSignOnService Binding="{REDIRECT}" Location="https://login.staging.ubuntu.com/saml/"/>
    </md:IDPSSODescriptor>
  </md:EntityDescriptor>
</md:EntitiesDescriptor>
"#,
        first = wrapped(&signer.cert_b64),
        second = wrapped(second_cert),
    );
    sign::sign(&xml, &signer.key).unwrap()
}

/// Metadata checked in under `test-data/metadata`.
pub fn metadata_fixture(name: &str) -> String {
    std::fs::read_to_string(std::path::Path::new("../../test-data/metadata").join(name)).unwrap()
}
