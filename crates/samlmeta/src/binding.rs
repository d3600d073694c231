#![forbid(unsafe_code)]

//! SAML 2.0 binding URIs and the method tokens used in relation data keys.

use samlmeta_core::algorithm;
use std::fmt;

/// A SAML binding, recognised from its URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    HttpRedirect,
    HttpPost,
    HttpArtifact,
    Soap,
    Paos,
    Uri,
    /// Any binding outside the SAML 2.0 core set.
    Other(String),
}

const KNOWN: [(&str, Binding); 6] = [
    (algorithm::BINDING_HTTP_REDIRECT, Binding::HttpRedirect),
    (algorithm::BINDING_HTTP_POST, Binding::HttpPost),
    (algorithm::BINDING_HTTP_ARTIFACT, Binding::HttpArtifact),
    (algorithm::BINDING_SOAP, Binding::Soap),
    (algorithm::BINDING_PAOS, Binding::Paos),
    (algorithm::BINDING_URI, Binding::Uri),
];

impl Binding {
    /// Recognise a binding URI, ignoring ASCII case.
    ///
    /// Matching ignores case so the `HTTP-Post` spelling found in some
    /// deployed metadata maps to [`Binding::HttpPost`].
    pub fn from_uri(uri: &str) -> Self {
        KNOWN
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(uri))
            .map(|(_, binding)| binding.clone())
            .unwrap_or_else(|| Self::Other(uri.to_owned()))
    }

    /// Token used in `{endpoint}_{method}_url` relation keys.
    ///
    /// For unrecognised bindings this is the last `:` segment of the URI,
    /// then its last `-` segment, lower-cased; `http` if that is empty.
    pub fn method(&self) -> String {
        match self {
            Self::HttpRedirect => "redirect".into(),
            Self::HttpPost => "post".into(),
            Self::HttpArtifact => "artifact".into(),
            Self::Soap => "soap".into(),
            Self::Paos => "paos".into(),
            Self::Uri => "uri".into(),
            Self::Other(uri) => {
                let tail = uri.rsplit(':').next().unwrap_or_default();
                let token = tail.rsplit('-').next().unwrap_or_default().to_ascii_lowercase();
                if token.is_empty() {
                    "http".into()
                } else {
                    token
                }
            }
        }
    }

    /// The binding URI; `Other` keeps the URI it was read from.
    pub fn uri(&self) -> &str {
        match self {
            Self::HttpRedirect => algorithm::BINDING_HTTP_REDIRECT,
            Self::HttpPost => algorithm::BINDING_HTTP_POST,
            Self::HttpArtifact => algorithm::BINDING_HTTP_ARTIFACT,
            Self::Soap => algorithm::BINDING_SOAP,
            Self::Paos => algorithm::BINDING_PAOS,
            Self::Uri => algorithm::BINDING_URI,
            Self::Other(uri) => uri,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}
