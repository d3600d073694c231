#![forbid(unsafe_code)]

//! SAML identity provider metadata: fetch, trust verification and extraction.
//!
//! A [`MetadataCycle`] fetches one metadata document, decides whether it
//! can be trusted under a [`TrustConfig`], and derives the entity's
//! certificates and SSO/SLO endpoints from it. Everything is computed on
//! first access and the document is fetched at most once per cycle.

pub mod binding;
pub mod config;
pub mod cycle;
pub mod extract;
pub mod relation;
pub mod source;

pub use binding::Binding;
pub use config::{PinTarget, TrustConfig};
pub use cycle::MetadataCycle;
pub use extract::{CertificateSet, Endpoint};
pub use relation::SamlRelationData;
pub use source::InMemorySource;

pub use samlmeta_c14n as c14n;
pub use samlmeta_core as core;
pub use samlmeta_core::{Error, Result};
pub use samlmeta_crypto as crypto;
pub use samlmeta_dsig as dsig;
pub use samlmeta_net as net;
pub use samlmeta_xml as xml;
