#![forbid(unsafe_code)]

//! Owned metadata document over roxmltree.

use samlmeta_core::{ns, Error};

/// A well-formed metadata document. Stores the validated text.
///
/// `roxmltree` trees borrow their input, so the tree is not kept. Use
/// [`MetadataDocument::parse_with`] to read everything needed while the
/// text is parsed, or [`MetadataDocument::parse_doc`] for a temporary tree.
/// The document carries no trust state; verification results live beside it.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    text: String,
}

impl MetadataDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        Self::parse_with(text, |_| Ok(())).map(|(document, ())| document)
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        Self::parse(utf8(data)?)
    }

    /// Parse the text once and run `read` over the tree before it is dropped.
    pub fn parse_with<T>(
        text: String,
        read: impl FnOnce(&roxmltree::Document<'_>) -> Result<T, Error>,
    ) -> Result<(Self, T), Error> {
        let value = {
            let doc = roxmltree::Document::parse_with_options(&text, crate::parsing_options())
                .map_err(|e| Error::MalformedDocument(e.to_string()))?;
            tracing::debug!(
                root = doc.root_element().tag_name().name(),
                "parsed metadata document"
            );
            read(&doc)?
        };
        Ok((Self { text }, value))
    }

    /// [`MetadataDocument::parse_with`] over bytes.
    pub fn parse_bytes_with<T>(
        data: &[u8],
        read: impl FnOnce(&roxmltree::Document<'_>) -> Result<T, Error>,
    ) -> Result<(Self, T), Error> {
        Self::parse_with(utf8(data)?, read)
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parse the stored text again and return a temporary tree.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        roxmltree::Document::parse_with_options(&self.text, crate::parsing_options())
            .map_err(|e| Error::MalformedDocument(e.to_string()))
    }

    /// Find the first descendant element with the given local name and namespace.
    pub fn find_element<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        ns: &str,
        local_name: &str,
    ) -> Option<roxmltree::Node<'a, 'input>> {
        doc.descendants().find(|n| is_element_named(n, ns, local_name))
    }

    /// Every element whose `ID` (or `Id`) attribute equals `id`.
    ///
    /// SAML uses `ID`; `Id` is accepted for signatures produced by generic
    /// XML-DSig tooling. More than one match means the ID is ambiguous.
    pub fn elements_with_id<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        id: &str,
    ) -> Vec<roxmltree::Node<'a, 'input>> {
        doc.descendants()
            .filter(|n| {
                n.is_element()
                    && (n.attribute(ns::attr::ID) == Some(id)
                        || n.attribute(ns::attr::ID_LOWER) == Some(id))
            })
            .collect()
    }
}

fn utf8(data: &[u8]) -> Result<String, Error> {
    std::str::from_utf8(data)
        .map(str::to_owned)
        .map_err(|e| Error::MalformedDocument(format!("invalid UTF-8: {e}")))
}

/// Whether `node` is an element with the given namespace and local name.
pub fn is_element_named(node: &roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

/// Find the first child element with the given namespace and local name.
pub fn find_child_element<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|n| is_element_named(n, ns, local_name))
}

/// Find all child elements with the given namespace and local name.
pub fn find_child_elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(|n| is_element_named(n, ns, local_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_input() {
        let err = MetadataDocument::parse_bytes(b"invalid").unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn rejects_unclosed_element() {
        let err = MetadataDocument::parse("<a><b></a>".into()).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn rejects_non_utf8() {
        let err = MetadataDocument::parse_bytes(&[0x3c, 0xff, 0xfe, 0x3e]).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn rejects_dtd() {
        let xml = r#"<!DOCTYPE a [<!ENTITY e "x">]><a>&e;</a>"#;
        assert!(MetadataDocument::parse(xml.into()).is_err());
    }

    #[test]
    fn parse_with_reads_the_tree_once() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example/meta"/>"#;
        let mut calls = 0;
        let (md, entity_id) = MetadataDocument::parse_with(xml.to_owned(), |doc| {
            calls += 1;
            Ok(doc.root_element().attribute(ns::attr::ENTITY_ID).map(str::to_owned))
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(entity_id.as_deref(), Some("https://idp.example/meta"));
        assert_eq!(md.text(), xml);
    }

    #[test]
    fn parse_with_reader_error_is_returned() {
        let err = MetadataDocument::parse_bytes_with(b"<a/>", |_| {
            Err::<(), _>(Error::Query("unbound".into()))
        })
        .unwrap_err();
        assert_eq!(err, Error::Query("unbound".into()));
    }

    #[test]
    fn finds_elements_by_id() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" ID="_abc" entityID="x"><md:Extensions Id="_abc"/><md:IDPSSODescriptor ID="_sso"/></md:EntityDescriptor>"#;
        let md = MetadataDocument::parse(xml.into()).unwrap();
        let doc = md.parse_doc().unwrap();
        let root = doc.root_element();
        let matches = MetadataDocument::elements_with_id(&doc, "_abc");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id(), root.id());
        assert_eq!(MetadataDocument::elements_with_id(&doc, "_sso").len(), 1);
        assert!(MetadataDocument::elements_with_id(&doc, "_none").is_empty());
    }

    #[test]
    fn finds_elements_by_namespace() {
        let xml = r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata">
            <KeyDescriptor/><x:KeyDescriptor xmlns:x="urn:other"/>
        </EntityDescriptor>"#;
        let md = MetadataDocument::parse(xml.into()).unwrap();
        let doc = md.parse_doc().unwrap();
        let root = doc.root_element();
        assert!(find_child_element(root, "urn:other", ns::node::KEY_DESCRIPTOR).is_some());
        assert_eq!(find_child_elements(root, ns::MD, ns::node::KEY_DESCRIPTOR).len(), 1);
        assert!(MetadataDocument::find_element(&doc, ns::DSIG, ns::node::SIGNATURE).is_none());
    }
}
