#![forbid(unsafe_code)]

//! Shared rendering utilities for C14N output.
//!
//! roxmltree resolves names to namespace URIs and keeps no prefixes, so the
//! qualified names written to the canonical form are recovered here from
//! the source text and the in-scope declarations.

use samlmeta_core::ns;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A namespace declaration to be rendered. Sorts by prefix, which puts
/// the default namespace ("") first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NsDecl {
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn render(&self) -> String {
        match self.prefix.as_str() {
            "" => format!(" xmlns=\"{}\"", escape_attr(&self.uri)),
            p => format!(" xmlns:{p}=\"{}\"", escape_attr(&self.uri)),
        }
    }
}

/// An attribute to be rendered.
///
/// Field order gives the canonical sort: unqualified attributes (empty
/// namespace URI) first, then by (namespace URI, local name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attr {
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn render(&self) -> String {
        format!(" {}=\"{}\"", self.qualified_name, escape_attr(&self.value))
    }
}

/// Escape text node content: `&`, `<`, `>` and CR.
pub fn escape_text(s: &str) -> String {
    escape_with(s, |ch| match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '\r' => Some("&#xD;"),
        _ => None,
    })
}

/// Escape an attribute value: `&`, `<`, `"` and the whitespace controls.
pub fn escape_attr(s: &str) -> String {
    escape_with(s, |ch| match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '"' => Some("&quot;"),
        '\t' => Some("&#x9;"),
        '\n' => Some("&#xA;"),
        '\r' => Some("&#xD;"),
        _ => None,
    })
}

/// Escape processing instruction data.
pub fn escape_pi(s: &str) -> String {
    s.replace('\r', "&#xD;")
}

fn escape_with(s: &str, entity: impl Fn(char) -> Option<&'static str>) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match entity(ch) {
            Some(e) => out.push_str(e),
            None => out.push(ch),
        }
    }
    out
}

/// The element's qualified name as written in the source.
pub fn element_qname<'a, 'input: 'a>(node: &roxmltree::Node<'a, 'input>) -> Cow<'a, str> {
    let local = node.tag_name().name();
    let text = node.document().input_text();
    if let Some(tag) = text.get(node.range().start..).and_then(|t| t.strip_prefix('<')) {
        let end = tag
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .unwrap_or(tag.len());
        let qname = &tag[..end];
        let written_local = qname.split_once(':').map_or(qname, |(_, l)| l);
        if written_local == local {
            return Cow::Borrowed(&text[node.range().start + 1..][..end]);
        }
    }
    // Source position unavailable; fall back to any binding of the URI.
    match node.tag_name().namespace().and_then(|uri| prefix_for(node, uri)) {
        Some(prefix) if !prefix.is_empty() => Cow::Owned(format!("{prefix}:{local}")),
        _ => Cow::Borrowed(local),
    }
}

/// Prefix of the element's qualified name ("" when unprefixed).
pub fn element_prefix(node: &roxmltree::Node<'_, '_>) -> String {
    let qname = element_qname(node);
    qname
        .split_once(':')
        .map_or(String::new(), |(p, _)| p.to_owned())
}

/// Prefix of a namespaced attribute, `None` for unqualified attributes.
///
/// Attributes never take the default namespace, so only prefixed
/// declarations are considered.
pub fn attr_prefix(
    node: &roxmltree::Node<'_, '_>,
    attr: &roxmltree::Attribute<'_, '_>,
) -> Option<String> {
    let uri = attr.namespace()?;
    if uri == ns::XML {
        return Some("xml".to_owned());
    }
    node.namespaces()
        .find(|d| d.uri() == uri && d.name().is_some())
        .and_then(|d| d.name())
        .map(str::to_owned)
}

/// Build the sortable attribute list for an element.
pub fn collect_attrs(node: &roxmltree::Node<'_, '_>) -> Vec<Attr> {
    let mut attrs: Vec<Attr> = node
        .attributes()
        .map(|attr| {
            let qualified_name = match attr_prefix(node, &attr) {
                Some(prefix) => format!("{prefix}:{}", attr.name()),
                None => attr.name().to_owned(),
            };
            Attr {
                ns_uri: attr.namespace().unwrap_or("").to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name,
                value: attr.value().to_owned(),
            }
        })
        .collect();
    attrs.sort();
    attrs
}

fn prefix_for(node: &roxmltree::Node<'_, '_>, uri: &str) -> Option<String> {
    node.namespaces()
        .find(|d| d.uri() == uri)
        .map(|d| d.name().unwrap_or("").to_owned())
}

/// All namespaces in scope at an element, keyed by prefix ("" for default).
///
/// Closer declarations override more distant ones; an empty URI undeclares.
pub fn inscope_namespaces(node: &roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = BTreeMap::new();
    for decl in node.namespaces() {
        let prefix = decl.name().unwrap_or("");
        if !seen.insert(prefix) || decl.uri().is_empty() {
            continue;
        }
        result.insert(prefix.to_owned(), decl.uri().to_owned());
    }
    result
}

/// Render a text, comment or PI node. Elements and the root are handled by
/// the calling canonicalizer.
pub fn render_leaf(node: &roxmltree::Node<'_, '_>, with_comments: bool, output: &mut Vec<u8>) {
    match node.node_type() {
        roxmltree::NodeType::Text => {
            let text = node.text().unwrap_or("");
            output.extend_from_slice(escape_text(text).as_bytes());
        }
        roxmltree::NodeType::Comment if with_comments => {
            with_document_level_newlines(node, output, |out| {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(node.text().unwrap_or("").as_bytes());
                out.extend_from_slice(b"-->");
            });
        }
        roxmltree::NodeType::PI => {
            let Some(pi) = node.pi() else {
                return;
            };
            with_document_level_newlines(node, output, |out| {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(pi.target.as_bytes());
                if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                    out.push(b' ');
                    out.extend_from_slice(escape_pi(value).as_bytes());
                }
                out.extend_from_slice(b"?>");
            });
        }
        _ => {}
    }
}

/// Outside the document element, comments and PIs are separated from it by
/// a newline on the side facing the element.
fn with_document_level_newlines(
    node: &roxmltree::Node<'_, '_>,
    output: &mut Vec<u8>,
    body: impl FnOnce(&mut Vec<u8>),
) {
    let at_root = node
        .parent()
        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);
    if at_root && node.prev_siblings().any(|s| s.is_element()) {
        output.push(b'\n');
    }
    body(output);
    if at_root && node.next_siblings().any(|s| s.is_element()) {
        output.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_prefix_when_uri_is_bound_twice() {
        let xml = r#"<EntityDescriptor xmlns="urn:m" xmlns:md="urn:m"><md:KeyDescriptor/></EntityDescriptor>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let root = doc.root_element();
        assert_eq!(element_qname(&root), "EntityDescriptor");
        assert_eq!(element_prefix(&root), "");
        let child = root.first_element_child().unwrap();
        assert_eq!(element_qname(&child), "md:KeyDescriptor");
        assert_eq!(element_prefix(&child), "md");
    }

    #[test]
    fn attributes_sort_unqualified_first() {
        let xml = r#"<a xmlns:x="urn:x" x:b="1" z="2" a="3" xml:lang="en"/>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let attrs = collect_attrs(&doc.root_element());
        let names: Vec<_> = attrs.iter().map(|a| a.qualified_name.as_str()).collect();
        assert_eq!(names, ["a", "z", "xml:lang", "x:b"]);
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_text("a&b<c>d\re"), "a&amp;b&lt;c&gt;d&#xD;e");
        assert_eq!(escape_attr("a&b\"c>"), "a&amp;b&quot;c>");
        assert_eq!(escape_attr("a\tb\nc\rd"), "a&#x9;b&#xA;c&#xD;d");
    }

    #[test]
    fn ns_decls_sort_default_first() {
        let mut decls = vec![
            NsDecl { prefix: "b".into(), uri: "urn:b".into() },
            NsDecl { prefix: String::new(), uri: "urn:d".into() },
            NsDecl { prefix: "a".into(), uri: "urn:a".into() },
        ];
        decls.sort();
        let rendered: String = decls.iter().map(NsDecl::render).collect();
        assert_eq!(rendered, r#" xmlns="urn:d" xmlns:a="urn:a" xmlns:b="urn:b""#);
    }
}
