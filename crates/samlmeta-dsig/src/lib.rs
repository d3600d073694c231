#![forbid(unsafe_code)]

//! Enveloped XML Digital Signature verification for SAML metadata.
//!
//! Verification always uses a certificate chosen by the caller. The
//! signature must cover the whole document: its `Reference` is either
//! `URI=""` or a same-document reference to the document element.

pub mod transforms;
pub mod verify;

#[cfg(any(test, feature = "test-util"))]
pub mod sign;

pub use verify::{verify, VerifyResult};

/// Read the `InclusiveNamespaces PrefixList` under a C14N method or transform.
pub(crate) fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    samlmeta_xml::document::find_child_element(
        node,
        samlmeta_core::ns::EXC_C14N,
        samlmeta_core::ns::node::INCLUSIVE_NAMESPACES,
    )
    .and_then(|n| n.attribute(samlmeta_core::ns::attr::PREFIX_LIST))
    .map(|list| list.split_whitespace().map(str::to_owned).collect())
    .unwrap_or_default()
}
