#![forbid(unsafe_code)]

//! Enveloped signature verification against a caller-supplied certificate.
//!
//! Processing order:
//! 1. Locate the first `ds:Signature` and read `SignedInfo`
//! 2. Check that every `Reference` covers the whole document
//! 3. Run each reference's transforms and compare digests
//! 4. Canonicalize `SignedInfo` and verify `SignatureValue`

use crate::transforms::{self, TransformData};
use base64::Engine;
use samlmeta_c14n::C14nMode;
use samlmeta_core::{ns, Error};
use samlmeta_crypto::{DigestMethod, SignatureMethod, X509Certificate};
use samlmeta_xml::document::{find_child_element, find_child_elements};
use samlmeta_xml::{MetadataDocument, NodeSet};
use subtle::ConstantTimeEq;

/// Outcome of verifying a well-formed signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature is present but does not hold.
    Invalid { reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }
}

/// Verify the enveloped signature of a parsed document with `signing_cert`.
///
/// `Err` means the signature could not be processed at all (missing
/// elements, unknown algorithms, bad encodings). `Ok(Invalid)` means it was
/// processed and rejected.
pub fn verify(
    doc: &roxmltree::Document<'_>,
    signing_cert: &X509Certificate,
) -> Result<VerifyResult, Error> {
    let sig_node = MetadataDocument::find_element(doc, ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MissingElement("Signature".into()))?;
    let signed_info = required_child(sig_node, ns::node::SIGNED_INFO)?;

    let c14n_method_node = required_child(signed_info, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_uri = algorithm_of(c14n_method_node, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {c14n_uri}")))?;
    let inclusive_prefixes = crate::read_inclusive_prefixes(c14n_method_node);

    let sig_method_node = required_child(signed_info, ns::node::SIGNATURE_METHOD)?;
    let sig_method =
        SignatureMethod::from_uri(algorithm_of(sig_method_node, ns::node::SIGNATURE_METHOD)?)?;

    let references = find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE);
    if references.is_empty() {
        return Err(Error::MissingElement("Reference".into()));
    }
    for reference in references {
        if let VerifyResult::Invalid { reason } = verify_reference(doc, reference, sig_node)? {
            tracing::debug!(reason = reason.as_str(), "reference rejected");
            return Ok(VerifyResult::Invalid { reason });
        }
    }

    let c14n_signed_info =
        samlmeta_c14n::canonicalize_subtree(signed_info, c14n_mode, &inclusive_prefixes)?;
    let sig_value = decode_base64(
        required_child(sig_node, ns::node::SIGNATURE_VALUE)?,
        ns::node::SIGNATURE_VALUE,
    )?;

    let key = signing_cert.verifying_key()?;
    tracing::debug!(
        algorithm = sig_method.uri(),
        key = key.kind(),
        "verifying SignatureValue"
    );
    if sig_method.verify(&key, &c14n_signed_info, &sig_value)? {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Invalid {
            reason: "signature value verification failed".into(),
        })
    }
}

fn verify_reference(
    doc: &roxmltree::Document<'_>,
    reference: roxmltree::Node<'_, '_>,
    sig_node: roxmltree::Node<'_, '_>,
) -> Result<VerifyResult, Error> {
    let input = match resolve_whole_document(doc, reference)? {
        Ok(input) => input,
        Err(reason) => return Ok(VerifyResult::Invalid { reason }),
    };

    let digest_method = DigestMethod::from_uri(algorithm_of(
        required_child(reference, ns::node::DIGEST_METHOD)?,
        ns::node::DIGEST_METHOD,
    )?)?;
    let expected = decode_base64(
        required_child(reference, ns::node::DIGEST_VALUE)?,
        ns::node::DIGEST_VALUE,
    )?;

    let octets = transforms::apply_all(doc, reference, sig_node, input)?;
    let computed = digest_method.compute(&octets);

    if computed.len() == expected.len() && bool::from(computed.ct_eq(&expected)) {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Invalid {
            reason: "digest of the signed content does not match DigestValue".into(),
        })
    }
}

/// Resolve a reference URI, accepting only references to the whole document.
///
/// The inner `Err` carries the rejection reason for an otherwise
/// well-formed reference that signs less than the document.
fn resolve_whole_document(
    doc: &roxmltree::Document<'_>,
    reference: roxmltree::Node<'_, '_>,
) -> Result<std::result::Result<TransformData, String>, Error> {
    let Some(uri) = reference.attribute(ns::attr::URI) else {
        return Ok(Err("reference without URI does not cover the document".into()));
    };
    if uri.is_empty() {
        return Ok(Ok(TransformData::Nodes(None)));
    }

    let id = samlmeta_xml::query::parse_same_document_ref(uri)
        .ok_or_else(|| Error::InvalidUri(format!("unsupported reference URI: {uri}")))?;
    let targets = MetadataDocument::elements_with_id(doc, id);

    let root = doc.root_element();
    match targets.as_slice() {
        [] => Err(Error::InvalidUri(format!("ID not found: {id}"))),
        [target] if target.id() == root.id() => {
            Ok(Ok(TransformData::Nodes(Some(NodeSet::tree_without_comments(root)))))
        }
        [_] => Ok(Err(format!("reference {uri} does not cover the whole document"))),
        _ => Ok(Err(format!("ID {id} is not unique"))),
    }
}

fn required_child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    local_name: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    find_child_element(node, ns::DSIG, local_name)
        .ok_or_else(|| Error::MissingElement(local_name.into()))
}

fn algorithm_of<'a>(node: roxmltree::Node<'a, '_>, owner: &str) -> Result<&'a str, Error> {
    node.attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute(format!("Algorithm on {owner}")))
}

fn decode_base64(node: roxmltree::Node<'_, '_>, owner: &str) -> Result<Vec<u8>, Error> {
    let clean: String = node
        .text()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{owner}: {e}")))
}
