#![forbid(unsafe_code)]

//! Offline metadata sources.

use samlmeta_core::{Error, Result};
use samlmeta_net::MetadataSource;
use std::path::Path;

/// Serves fixed bytes regardless of the requested URL.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    bytes: Vec<u8>,
}

impl InMemorySource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Read a metadata file from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::NetworkFailure {
            url: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(bytes))
    }
}

impl MetadataSource for InMemorySource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(%url, bytes = self.bytes.len(), "serving metadata from memory");
        Ok(self.bytes.clone())
    }
}
