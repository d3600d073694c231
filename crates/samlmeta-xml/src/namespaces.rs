#![forbid(unsafe_code)]

//! Prefix → namespace URI map used to resolve qualified query names.

use samlmeta_core::ns;
use std::collections::BTreeMap;

/// Namespace bindings available to queries.
///
/// Seeded from the document element's in-scope declarations, then `md`
/// and `ds` are always bound to the SAML metadata and XML-DSig namespaces.
/// Documents that declare those as the default namespace, or under other
/// prefixes, are therefore queryable with the conventional names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMap {
    bindings: BTreeMap<String, String>,
}

impl NamespaceMap {
    /// Map containing only the conventional `md` and `ds` bindings.
    pub fn conventional() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(ns::MD_PREFIX.to_owned(), ns::MD.to_owned());
        bindings.insert(ns::DSIG_PREFIX.to_owned(), ns::DSIG.to_owned());
        Self { bindings }
    }

    /// Build the map for a parsed document.
    pub fn from_document(doc: &roxmltree::Document<'_>) -> Self {
        let mut map = Self::conventional();
        for decl in doc.root_element().namespaces() {
            let Some(prefix) = decl.name() else {
                continue;
            };
            match map.bindings.get(prefix) {
                Some(existing) if existing != decl.uri() => {
                    tracing::debug!(
                        prefix,
                        uri = decl.uri(),
                        "document prefix shadows a conventional binding, keeping the conventional one"
                    );
                }
                Some(_) => {}
                None => {
                    map.bindings.insert(prefix.to_owned(), decl.uri().to_owned());
                }
            }
        }
        map
    }

    /// Resolve a prefix.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

impl Default for NamespaceMap {
    fn default() -> Self {
        Self::conventional()
    }
}
