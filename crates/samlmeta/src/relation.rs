#![forbid(unsafe_code)]

//! Flat string-keyed relation data published to consumers.
//!
//! Keys:
//!
//! - `entity_id`, `metadata_url`
//! - `x509certs`: certificates joined with `,`
//! - per endpoint: `{name}_{method}_url`, `{name}_{method}_binding` and,
//!   when present, `{name}_{method}_response_url`, where `name` is the
//!   element name in snake case and `method` comes from [`Binding::method`].

use crate::binding::Binding;
use crate::extract::Endpoint;
use std::collections::BTreeMap;

const ENTITY_ID: &str = "entity_id";
const METADATA_URL: &str = "metadata_url";
const X509_CERTS: &str = "x509certs";

/// Everything a relying party needs about one IdP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlRelationData {
    pub entity_id: String,
    pub metadata_url: String,
    pub certificates: Vec<String>,
    pub endpoints: Vec<Endpoint>,
}

impl SamlRelationData {
    pub fn to_relation_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert(ENTITY_ID.to_owned(), self.entity_id.clone());
        data.insert(METADATA_URL.to_owned(), self.metadata_url.clone());
        data.insert(X509_CERTS.to_owned(), self.certificates.join(","));
        for endpoint in &self.endpoints {
            let prefix = format!(
                "{}_{}",
                snake_case(&endpoint.name),
                Binding::from_uri(&endpoint.binding).method()
            );
            data.insert(format!("{prefix}_url"), endpoint.url.clone());
            data.insert(format!("{prefix}_binding"), endpoint.binding.clone());
            if let Some(response_url) = &endpoint.response_url {
                data.insert(format!("{prefix}_response_url"), response_url.clone());
            }
        }
        data
    }

    /// Rebuild relation data published by [`to_relation_data`](Self::to_relation_data).
    ///
    /// Returns `None` until both `entity_id` and `metadata_url` are present.
    /// Endpoints come back in key order.
    pub fn from_relation_data(data: &BTreeMap<String, String>) -> Option<Self> {
        let entity_id = data.get(ENTITY_ID)?.clone();
        let metadata_url = data.get(METADATA_URL)?.clone();
        let certificates = data
            .get(X509_CERTS)
            .map(|certs| {
                certs
                    .split(',')
                    .filter(|c| !c.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let endpoints = data
            .iter()
            .filter_map(|(key, url)| {
                let prefix = key.strip_suffix("_url")?;
                if prefix.ends_with("_response") || key == METADATA_URL {
                    return None;
                }
                let (snake_name, _method) = prefix.rsplit_once('_')?;
                Some(Endpoint {
                    name: camel_case(snake_name),
                    url: url.clone(),
                    binding: data.get(&format!("{prefix}_binding"))?.clone(),
                    response_url: data.get(&format!("{prefix}_response_url")).cloned(),
                })
            })
            .collect();

        Some(Self {
            entity_id,
            metadata_url,
            certificates,
            endpoints,
        })
    }
}

/// `SingleSignOnService` → `single_sign_on_service`.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `single_sign_on_service` → `SingleSignOnService`.
fn camel_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";

    fn staging() -> SamlRelationData {
        SamlRelationData {
            entity_id: "https://login.staging.ubuntu.com".into(),
            metadata_url: "https://login.staging.ubuntu.com/saml/metadata".into(),
            certificates: vec!["cert1".into(), "cert2".into()],
            endpoints: vec![
                Endpoint {
                    name: "SingleSignOnService".into(),
                    url: "https://login.staging.ubuntu.com/saml/".into(),
                    binding: REDIRECT.into(),
                    response_url: None,
                },
                Endpoint {
                    name: "SingleLogoutService".into(),
                    url: "https://login.staging.ubuntu.com/+logout".into(),
                    binding: REDIRECT.into(),
                    response_url: Some("https://login.staging.ubuntu.com/+logout2".into()),
                },
            ],
        }
    }

    #[test]
    fn to_relation_data_uses_flat_keys() {
        let expected: BTreeMap<String, String> = [
            ("entity_id", "https://login.staging.ubuntu.com"),
            ("metadata_url", "https://login.staging.ubuntu.com/saml/metadata"),
            ("x509certs", "cert1,cert2"),
            ("single_sign_on_service_redirect_url", "https://login.staging.ubuntu.com/saml/"),
            ("single_sign_on_service_redirect_binding", REDIRECT),
            ("single_logout_service_redirect_url", "https://login.staging.ubuntu.com/+logout"),
            ("single_logout_service_redirect_binding", REDIRECT),
            (
                "single_logout_service_redirect_response_url",
                "https://login.staging.ubuntu.com/+logout2",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        assert_eq!(staging().to_relation_data(), expected);
    }

    #[test]
    fn from_relation_data_restores_endpoints_in_key_order() {
        let data = staging().to_relation_data();
        let restored = SamlRelationData::from_relation_data(&data).unwrap();
        assert_eq!(restored.entity_id, "https://login.staging.ubuntu.com");
        assert_eq!(restored.certificates, ["cert1", "cert2"]);

        let mut expected = staging().endpoints;
        expected.reverse();
        assert_eq!(restored.endpoints, expected);
    }

    #[test]
    fn incomplete_relation_data_is_none() {
        let mut data = staging().to_relation_data();
        data.remove("metadata_url");
        assert!(SamlRelationData::from_relation_data(&data).is_none());
        assert!(SamlRelationData::from_relation_data(&BTreeMap::new()).is_none());
    }

    #[test]
    fn empty_certificate_list() {
        let mut relation = staging();
        relation.certificates.clear();
        let data = relation.to_relation_data();
        assert_eq!(data["x509certs"], "");
        let restored = SamlRelationData::from_relation_data(&data).unwrap();
        assert!(restored.certificates.is_empty());
    }

    #[test]
    fn case_conversion() {
        assert_eq!(snake_case("SingleSignOnService"), "single_sign_on_service");
        assert_eq!(snake_case("SingleLogoutService"), "single_logout_service");
        assert_eq!(camel_case("single_logout_service"), "SingleLogoutService");
    }
}
