#![forbid(unsafe_code)]

//! Blocking HTTP(S) retrieval of metadata documents.

use crate::MetadataSource;
use reqwest::blocking::Client;
use samlmeta_core::{Error, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

/// Total request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest metadata body accepted (5 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Fetches metadata with `reqwest` in blocking mode.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_size: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_max_size(timeout, DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(timeout: Duration, max_size: u64) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidConfig("fetch timeout must be positive".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout,
            max_size,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the body.
    ///
    /// Every failure, including a timeout, is a `NetworkFailure` naming `url`.
    pub fn get(&self, url: &str) -> Result<Vec<u8>> {
        let failure = |reason: String| Error::NetworkFailure {
            url: url.to_owned(),
            reason,
        };

        let parsed = Url::parse(url).map_err(|e| failure(format!("invalid URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(failure(format!("unsupported URL scheme '{scheme}'"))),
        }

        tracing::debug!(%url, timeout_ms = self.timeout.as_millis() as u64, "fetching metadata");
        let response = self.client.get(parsed).send().map_err(|e| {
            if e.is_timeout() {
                failure(format!("timed out after {:?}", self.timeout))
            } else {
                failure(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(format!("HTTP {status}")));
        }
        if response.content_length().is_some_and(|len| len > self.max_size) {
            return Err(failure(format!("response exceeds {} bytes", self.max_size)));
        }

        let mut body = Vec::new();
        response
            .take(self.max_size + 1)
            .read_to_end(&mut body)
            .map_err(|e| failure(format!("failed to read response: {e}")))?;
        if body.len() as u64 > self.max_size {
            return Err(failure(format!("response exceeds {} bytes", self.max_size)));
        }

        tracing::debug!(%url, bytes = body.len(), "metadata received");
        Ok(body)
    }
}

impl MetadataSource for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.get(url)
    }
}
