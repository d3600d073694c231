#![forbid(unsafe_code)]

//! Template signing for building signed metadata fixtures.
//!
//! Fills the empty `DigestValue` and `SignatureValue` elements of a
//! `ds:Signature` template. Only compiled for tests and the `test-util`
//! feature; production code never signs.

use crate::transforms::{self, TransformData};
use base64::Engine;
use samlmeta_c14n::C14nMode;
use samlmeta_core::{algorithm, ns, Error};
use samlmeta_xml::document::{find_child_element, find_child_elements};
use samlmeta_xml::{MetadataDocument, NodeSet};

/// Private key used to sign a template.
pub enum SigningKey {
    EcP256(p256::ecdsa::SigningKey),
    EcP384(p384::ecdsa::SigningKey),
}

impl SigningKey {
    /// Load a PKCS#8 DER private key, detecting the curve.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, Error> {
        use p256::pkcs8::DecodePrivateKey;
        p256::ecdsa::SigningKey::from_pkcs8_der(der)
            .map(Self::EcP256)
            .or_else(|_| p384::ecdsa::SigningKey::from_pkcs8_der(der).map(Self::EcP384))
            .map_err(|e| Error::Crypto(format!("unsupported private key: {e}")))
    }

    pub fn signature_uri(&self) -> &'static str {
        match self {
            Self::EcP256(_) => algorithm::ECDSA_SHA256,
            Self::EcP384(_) => algorithm::ECDSA_SHA384,
        }
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        use signature::Signer;
        match self {
            Self::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk.sign(data);
                samlmeta_crypto::sign::p256_to_xmldsig(&sig)
            }
            Self::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk.sign(data);
                sig.to_bytes().to_vec()
            }
        }
    }
}

/// Build an empty `ds:Signature` element.
///
/// The reference carries the enveloped-signature transform followed by
/// `mode`, and `KeyInfo` carries `cert_b64`.
pub fn signature_template(
    key: &SigningKey,
    mode: C14nMode,
    reference_uri: &str,
    cert_b64: &str,
) -> String {
    let c14n = mode.uri();
    let sig_alg = key.signature_uri();
    let env = algorithm::ENVELOPED_SIGNATURE;
    let sha256 = algorithm::SHA256;
    format!(
        r#"<ds:Signature xmlns:ds="{dsig}"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="{c14n}"/><ds:SignatureMethod Algorithm="{sig_alg}"/><ds:Reference URI="{reference_uri}"><ds:Transforms><ds:Transform Algorithm="{env}"/><ds:Transform Algorithm="{c14n}"/></ds:Transforms><ds:DigestMethod Algorithm="{sha256}"/><ds:DigestValue></ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue></ds:SignatureValue><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert_b64}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></ds:Signature>"#,
        dsig = ns::DSIG,
    )
}

/// Sign a document containing a `ds:Signature` template.
pub fn sign(template_xml: &str, key: &SigningKey) -> Result<String, Error> {
    let engine = base64::engine::general_purpose::STANDARD;
    let template = MetadataDocument::parse(template_xml.to_owned())?;
    let doc = template.parse_doc()?;

    let sig_node = MetadataDocument::find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MissingElement("Signature".into()))?;
    let signed_info = find_child_element(sig_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

    let mut result_xml = template_xml.to_owned();
    for reference in find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
        let uri = reference.attribute(ns::attr::URI).unwrap_or("");
        let input = match samlmeta_xml::query::parse_same_document_ref(uri) {
            None => TransformData::Nodes(None),
            Some(id) => {
                let node = match MetadataDocument::elements_with_id(&doc, id).as_slice() {
                    [node] => *node,
                    [] => return Err(Error::InvalidUri(format!("ID not found: {id}"))),
                    _ => return Err(Error::InvalidUri(format!("ID {id} is not unique"))),
                };
                TransformData::Nodes(Some(NodeSet::tree_without_comments(node)))
            }
        };
        let octets = transforms::apply_all(&doc, reference, sig_node, input)?;
        let digest_uri = find_child_element(reference, ns::DSIG, ns::node::DIGEST_METHOD)
            .and_then(|n| n.attribute(ns::attr::ALGORITHM))
            .ok_or_else(|| Error::MissingAttribute("Algorithm on DigestMethod".into()))?;
        let digest = samlmeta_crypto::digest::digest(digest_uri, &octets)?;
        result_xml = result_xml.replacen(
            "<ds:DigestValue></ds:DigestValue>",
            &format!("<ds:DigestValue>{}</ds:DigestValue>", engine.encode(digest)),
            1,
        );
    }

    let updated = MetadataDocument::parse(result_xml.clone())?;
    let updated_doc = updated.parse_doc()?;
    let updated_sig = MetadataDocument::find_element(&updated_doc, ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MissingElement("Signature".into()))?;
    let updated_signed_info = find_child_element(updated_sig, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;
    let c14n_method =
        find_child_element(updated_signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
    let mode = c14n_method
        .attribute(ns::attr::ALGORITHM)
        .and_then(C14nMode::from_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm("CanonicalizationMethod".into()))?;
    let c14n_signed_info = samlmeta_c14n::canonicalize_subtree(
        updated_signed_info,
        mode,
        &crate::read_inclusive_prefixes(c14n_method),
    )?;

    let signature = key.sign(&c14n_signed_info);
    Ok(result_xml.replacen(
        "<ds:SignatureValue></ds:SignatureValue>",
        &format!(
            "<ds:SignatureValue>{}</ds:SignatureValue>",
            engine.encode(signature)
        ),
        1,
    ))
}
