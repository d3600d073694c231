#![forbid(unsafe_code)]

//! Entity-scoped extraction of certificates and endpoints.
//!
//! Every function reads an already parsed tree, so one parse serves the
//! whole cycle. Entity queries are scoped to
//! `md:EntityDescriptor[@entityID=$entity_id]`. The entity ID is bound as a
//! query variable, never spliced into the expression. An entity ID that
//! matches nothing yields empty results.

use samlmeta_core::{ns, Error, Result};
use samlmeta_crypto::cert::normalize_base64;
use samlmeta_xml::{NamespaceMap, Query, Variables};
use std::collections::BTreeSet;
use url::Url;

const SIGNING_CERTIFICATE: &str = "//md:KeyDescriptor[@use='signing']//ds:X509Certificate";
const SIGNATURE: &str = "//ds:Signature";
const ENTITY_CERTIFICATES: &str =
    "//md:EntityDescriptor[@entityID=$entity_id]//md:KeyDescriptor//ds:X509Certificate";
const ENTITY_ENDPOINTS: &str =
    "//md:EntityDescriptor[@entityID=$entity_id]//md:SingleSignOnService \
     | //md:EntityDescriptor[@entityID=$entity_id]//md:SingleLogoutService";

/// Certificates published for an entity.
///
/// Unsigned metadata gives an unordered set. Verified signed metadata gives
/// a list in document order, led by the signing certificate when the
/// entity publishes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSet {
    Unordered(BTreeSet<String>),
    Signed(Vec<String>),
}

impl CertificateSet {
    /// Base64 certificates, in list order for the signed form.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::Unordered(set) => Box::new(set.iter().map(String::as_str)),
            Self::Signed(list) => Box::new(list.iter().map(String::as_str)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Unordered(set) => set.len(),
            Self::Signed(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, cert: &str) -> bool {
        self.iter().any(|c| c == cert)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_owned).collect()
    }
}

/// A `SingleSignOnService` or `SingleLogoutService` of the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Element local name.
    pub name: String,
    /// `Location`, an absolute HTTP(S) URL.
    pub url: String,
    /// SAML binding URI.
    pub binding: String,
    /// `ResponseLocation` when present; never defaulted to `url`.
    pub response_url: Option<String>,
}

/// First signing certificate anywhere in the document, whitespace removed.
pub fn signing_certificate(tree: &roxmltree::Document<'_>) -> Result<Option<String>> {
    let query = Query::parse(SIGNING_CERTIFICATE, &NamespaceMap::from_document(tree))?;
    Ok(query
        .select(tree, &Variables::new())?
        .into_iter()
        .map(|node| normalize_base64(node.text().unwrap_or_default()))
        .find(|cert| !cert.is_empty()))
}

/// Whether the document carries a `ds:Signature` element.
pub fn has_signature(tree: &roxmltree::Document<'_>) -> Result<bool> {
    let query = Query::parse(SIGNATURE, &NamespaceMap::from_document(tree))?;
    Ok(query.select_first(tree, &Variables::new())?.is_some())
}

/// The entity's certificates in document order, duplicates kept.
pub fn entity_certificates(
    tree: &roxmltree::Document<'_>,
    entity_id: &str,
) -> Result<Vec<String>> {
    let query = Query::parse(ENTITY_CERTIFICATES, &NamespaceMap::from_document(tree))?;
    let vars = Variables::new().with("entity_id", entity_id);
    Ok(query
        .select(tree, &vars)?
        .into_iter()
        .map(|node| normalize_base64(node.text().unwrap_or_default()))
        .filter(|cert| !cert.is_empty())
        .collect())
}

/// Arrange the entity's certificates for the trust outcome.
///
/// `verified_signing_cert` is the signing certificate of a signature that
/// has already been verified; it selects the ordered form. It is moved to
/// the front only when the entity itself publishes it, so a signer that
/// belongs to another entity of an aggregate, or an unknown entity, never
/// adds a certificate.
pub fn arrange_certificates(
    mut found: Vec<String>,
    verified_signing_cert: Option<&str>,
) -> CertificateSet {
    let Some(signing) = verified_signing_cert else {
        return CertificateSet::Unordered(found.into_iter().collect());
    };
    if let Some(pos) = found.iter().position(|c| c == signing) {
        let cert = found.remove(pos);
        found.insert(0, cert);
    }
    CertificateSet::Signed(found)
}

/// Certificates for `entity_id`; see [`arrange_certificates`].
pub fn certificates(
    tree: &roxmltree::Document<'_>,
    entity_id: &str,
    verified_signing_cert: Option<&str>,
) -> Result<CertificateSet> {
    Ok(arrange_certificates(
        entity_certificates(tree, entity_id)?,
        verified_signing_cert,
    ))
}

/// SSO and SLO endpoints of `entity_id`, interleaved in document order.
///
/// A missing or non-HTTP(S) `Location`, a malformed `ResponseLocation` or
/// an empty `Binding` rejects the whole document.
pub fn endpoints(tree: &roxmltree::Document<'_>, entity_id: &str) -> Result<Vec<Endpoint>> {
    let query = Query::parse(ENTITY_ENDPOINTS, &NamespaceMap::from_document(tree))?;
    let vars = Variables::new().with("entity_id", entity_id);

    query
        .select(tree, &vars)?
        .into_iter()
        .map(|node| {
            let name = node.tag_name().name().to_owned();
            let binding = node
                .attribute(ns::attr::BINDING)
                .filter(|b| !b.trim().is_empty())
                .ok_or_else(|| Error::MalformedDocument(format!("{name} has no Binding")))?;
            let url = node
                .attribute(ns::attr::LOCATION)
                .ok_or_else(|| Error::MalformedDocument(format!("{name} has no Location")))?;
            let url = checked_url(&name, ns::attr::LOCATION, url)?;
            let response_url = node
                .attribute(ns::attr::RESPONSE_LOCATION)
                .map(|u| checked_url(&name, ns::attr::RESPONSE_LOCATION, u))
                .transpose()?;
            Ok(Endpoint {
                name,
                url,
                binding: binding.to_owned(),
                response_url,
            })
        })
        .collect()
}

fn checked_url(element: &str, attr: &str, value: &str) -> Result<String> {
    let valid = Url::parse(value)
        .ok()
        .is_some_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some());
    if valid {
        Ok(value.to_owned())
    } else {
        Err(Error::MalformedDocument(format!(
            "{element} {attr} is not an absolute HTTP(S) URL: {value:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"<?xml version="1.0"?>
<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
  <md:EntityDescriptor entityID="https://idp.example/meta">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
      <md:KeyDescriptor use="signing">
        <ds:KeyInfo><ds:X509Data><ds:X509Certificate>
          Q0VSVA==
        </ds:X509Certificate></ds:X509Data></ds:KeyInfo>
      </md:KeyDescriptor>
      <md:KeyDescriptor use="encryption">
        <ds:KeyInfo><ds:X509Data><ds:X509Certificate>RU5D</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
      </md:KeyDescriptor>
      <md:KeyDescriptor>
        <ds:KeyInfo><ds:X509Data><ds:X509Certificate>Q0VSVA==</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
      </md:KeyDescriptor>
      <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example/sso"/>
      <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example/slo" ResponseLocation="https://idp.example/slo-resp"/>
    </md:IDPSSODescriptor>
  </md:EntityDescriptor>
  <md:EntityDescriptor entityID="https://other.example/meta">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
      <md:KeyDescriptor use="signing">
        <ds:KeyInfo><ds:X509Data><ds:X509Certificate>T1RIRVI=</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
      </md:KeyDescriptor>
      <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://other.example/sso"/>
    </md:IDPSSODescriptor>
  </md:EntityDescriptor>
</md:EntitiesDescriptor>"#;

    fn doc(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse_with_options(xml, samlmeta_xml::parsing_options()).unwrap()
    }

    #[test]
    fn endpoints_in_document_order() {
        let endpoints = endpoints(&doc(METADATA), "https://idp.example/meta").unwrap();
        assert_eq!(
            endpoints,
            vec![
                Endpoint {
                    name: "SingleSignOnService".into(),
                    url: "https://idp.example/sso".into(),
                    binding: "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect".into(),
                    response_url: None,
                },
                Endpoint {
                    name: "SingleLogoutService".into(),
                    url: "https://idp.example/slo".into(),
                    binding: "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect".into(),
                    response_url: Some("https://idp.example/slo-resp".into()),
                },
            ]
        );
    }

    #[test]
    fn slo_before_sso_keeps_document_order() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example/meta">
  <md:IDPSSODescriptor>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.example/slo"/>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.example/sso"/>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example/slo2"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;
        let names: Vec<String> = endpoints(&doc(xml), "https://idp.example/meta")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            ["SingleLogoutService", "SingleSignOnService", "SingleLogoutService"]
        );
    }

    #[test]
    fn unsigned_certificates_are_a_set() {
        let certs = certificates(&doc(METADATA), "https://idp.example/meta", None).unwrap();
        assert_eq!(
            certs,
            CertificateSet::Unordered(["Q0VSVA==".to_owned(), "RU5D".to_owned()].into())
        );
    }

    #[test]
    fn signed_certificates_lead_with_signing_cert() {
        let certs = certificates(&doc(METADATA), "https://idp.example/meta", Some("RU5D")).unwrap();
        assert_eq!(
            certs.to_vec(),
            ["RU5D", "Q0VSVA==", "Q0VSVA=="].map(String::from).to_vec()
        );

        let certs =
            certificates(&doc(METADATA), "https://idp.example/meta", Some("Q0VSVA==")).unwrap();
        assert_eq!(certs.to_vec(), ["Q0VSVA==", "RU5D", "Q0VSVA=="].map(String::from).to_vec());
    }

    #[test]
    fn signer_of_another_entity_is_not_added() {
        let tree = doc(METADATA);
        let certs = certificates(&tree, "https://other.example/meta", Some("Q0VSVA==")).unwrap();
        assert_eq!(certs, CertificateSet::Signed(vec!["T1RIRVI=".to_owned()]));

        let certs = certificates(&tree, "https://nobody.example", Some("Q0VSVA==")).unwrap();
        assert_eq!(certs, CertificateSet::Signed(Vec::new()));
    }

    #[test]
    fn unknown_entity_yields_empty_results() {
        let doc = doc(METADATA);
        assert!(endpoints(&doc, "https://nobody.example").unwrap().is_empty());
        assert!(certificates(&doc, "https://nobody.example", None).unwrap().is_empty());
    }

    #[test]
    fn entity_id_with_quotes_is_matched_literally() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example/it's&quot;meta">
  <md:IDPSSODescriptor>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.example/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;
        let found = endpoints(&doc(xml), "https://idp.example/it's\"meta").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn signing_certificate_is_first_match() {
        let doc = doc(METADATA);
        assert_eq!(signing_certificate(&doc).unwrap().as_deref(), Some("Q0VSVA=="));
        assert!(!has_signature(&doc).unwrap());
    }

    #[test]
    fn default_namespace_documents_are_queryable() {
        let xml = r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example/meta">
  <IDPSSODescriptor>
    <KeyDescriptor use="signing">
      <KeyInfo xmlns="http://www.w3.org/2000/09/xmldsig#"><X509Data><X509Certificate>Q0VSVA==</X509Certificate></X509Data></KeyInfo>
    </KeyDescriptor>
    <SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.example/sso"/>
  </IDPSSODescriptor>
</EntityDescriptor>"#;
        let doc = doc(xml);
        assert_eq!(signing_certificate(&doc).unwrap().as_deref(), Some("Q0VSVA=="));
        assert_eq!(endpoints(&doc, "https://idp.example/meta").unwrap().len(), 1);
    }

    #[test]
    fn relative_location_rejects_document() {
        let xml = METADATA.replace("Location=\"https://idp.example/sso\"", "Location=\"/sso\"");
        assert!(matches!(
            endpoints(&doc(&xml), "https://idp.example/meta"),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn empty_binding_rejects_document() {
        let xml = METADATA.replace(
            r#"<md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect""#,
            r#"<md:SingleSignOnService Binding="""#,
        );
        assert!(matches!(
            endpoints(&doc(&xml), "https://idp.example/meta"),
            Err(Error::MalformedDocument(_))
        ));
    }
}
