#![forbid(unsafe_code)]

//! Core types shared by every samlmeta crate: the error taxonomy, XML
//! namespace constants and the algorithm URIs understood by the signature
//! verifier.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Pinned, Result};
