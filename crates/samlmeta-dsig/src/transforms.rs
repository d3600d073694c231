#![forbid(unsafe_code)]

//! Reference transforms: enveloped-signature and canonicalization.

use samlmeta_c14n::C14nMode;
use samlmeta_core::{algorithm, ns, Error};
use samlmeta_xml::NodeSet;

/// Data flowing through a reference's transform chain.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// A subset of the parsed document; `None` is the whole document
    /// without comments.
    Nodes(Option<NodeSet>),
    /// Canonical octets.
    Octets(Vec<u8>),
}

impl TransformData {
    /// Convert to octets, applying Canonical XML 1.0 to a remaining node set.
    pub fn into_octets(self, doc: &roxmltree::Document<'_>) -> Result<Vec<u8>, Error> {
        match self {
            Self::Octets(bytes) => Ok(bytes),
            Self::Nodes(set) => {
                let set = set.unwrap_or_else(|| NodeSet::all_without_comments(doc));
                samlmeta_c14n::canonicalize_doc(doc, C14nMode::Inclusive, Some(&set), &[])
            }
        }
    }
}

/// A single `ds:Transform`.
pub trait Transform {
    /// Algorithm URI this transform implements.
    fn uri(&self) -> &str;

    fn execute(
        &self,
        doc: &roxmltree::Document<'_>,
        input: TransformData,
    ) -> Result<TransformData, Error>;
}

/// Removes the enclosing `ds:Signature` subtree from the node set.
pub struct EnvelopedSignature {
    signature: roxmltree::NodeId,
}

impl Transform for EnvelopedSignature {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(
        &self,
        doc: &roxmltree::Document<'_>,
        input: TransformData,
    ) -> Result<TransformData, Error> {
        let TransformData::Nodes(set) = input else {
            return Err(Error::Canonicalization(
                "enveloped-signature transform requires a node set".into(),
            ));
        };
        let mut set = set.unwrap_or_else(|| NodeSet::all_without_comments(doc));
        let sig = doc
            .get_node(self.signature)
            .ok_or_else(|| Error::MissingElement("Signature".into()))?;
        set.remove_subtree(sig);
        Ok(TransformData::Nodes(Some(set)))
    }
}

/// Canonicalizes the node set into octets.
pub struct Canonicalize {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl Transform for Canonicalize {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(
        &self,
        doc: &roxmltree::Document<'_>,
        input: TransformData,
    ) -> Result<TransformData, Error> {
        let TransformData::Nodes(set) = input else {
            return Err(Error::Canonicalization(format!(
                "{} requires a node set",
                self.mode.uri()
            )));
        };
        let set = set.unwrap_or_else(|| NodeSet::all_without_comments(doc));
        let bytes =
            samlmeta_c14n::canonicalize_doc(doc, self.mode, Some(&set), &self.inclusive_prefixes)?;
        Ok(TransformData::Octets(bytes))
    }
}

/// Build the transform described by a `ds:Transform` element.
pub fn from_node(
    transform_node: roxmltree::Node<'_, '_>,
    signature: roxmltree::Node<'_, '_>,
) -> Result<Box<dyn Transform>, Error> {
    let uri = transform_node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on Transform".into()))?;
    if uri == algorithm::ENVELOPED_SIGNATURE {
        return Ok(Box::new(EnvelopedSignature {
            signature: signature.id(),
        }));
    }
    match C14nMode::from_uri(uri) {
        Some(mode) => Ok(Box::new(Canonicalize {
            mode,
            inclusive_prefixes: crate::read_inclusive_prefixes(transform_node),
        })),
        None => Err(Error::UnsupportedAlgorithm(format!("transform: {uri}"))),
    }
}

/// Run every `ds:Transform` under `reference` and return the octets to digest.
pub fn apply_all(
    doc: &roxmltree::Document<'_>,
    reference: roxmltree::Node<'_, '_>,
    signature: roxmltree::Node<'_, '_>,
    input: TransformData,
) -> Result<Vec<u8>, Error> {
    let mut data = input;
    if let Some(transforms) =
        samlmeta_xml::document::find_child_element(reference, ns::DSIG, ns::node::TRANSFORMS)
    {
        let nodes =
            samlmeta_xml::document::find_child_elements(transforms, ns::DSIG, ns::node::TRANSFORM);
        for node in nodes {
            let transform = from_node(node, signature)?;
            tracing::trace!(transform = transform.uri(), "applying transform");
            data = transform.execute(doc, data)?;
        }
    }
    data.into_octets(doc)
}
