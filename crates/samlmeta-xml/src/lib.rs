#![forbid(unsafe_code)]

//! XML document layer for SAML metadata.
//!
//! Provides an owned, validated document over `roxmltree`, the namespace
//! map used to resolve `md:`/`ds:` query prefixes, the `NodeSet` consumed by
//! canonicalization, and a small XPath subset for entity-scoped queries.

pub mod document;
pub mod namespaces;
pub mod nodeset;
pub mod query;

pub use document::MetadataDocument;
pub use namespaces::NamespaceMap;
pub use nodeset::NodeSet;
pub use query::{Query, Variables};

/// Return roxmltree parsing options used for metadata.
///
/// DTDs are rejected. Federation metadata never carries one and refusing
/// them keeps entity declarations out of the trust path.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: false,
        ..roxmltree::ParsingOptions::default()
    }
}
