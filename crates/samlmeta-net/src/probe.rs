#![forbid(unsafe_code)]

//! TLS leaf certificate fingerprint probe.
//!
//! Opens a TCP connection, completes a TLS handshake validated against the
//! webpki root store, and compares the SHA-256 of the peer's leaf
//! certificate with a pinned fingerprint in constant time.
//!
//! Name resolution goes through the system resolver on a helper thread and
//! is bounded by its own timeout. A lookup that outlives it is abandoned.

use crate::CertificateProbe;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use samlmeta_core::{Error, Result};
use samlmeta_crypto::Fingerprint;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes a host's TLS certificate.
#[derive(Debug, Clone)]
pub struct TlsProbe {
    port: u16,
    resolve_timeout: Duration,
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl Default for TlsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl TlsProbe {
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Upper bound on the DNS lookup for the probed host.
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Fetch the DER encoding of `host`'s leaf certificate.
    ///
    /// Resolution, connection and handshake each have their own timeout.
    pub fn leaf_certificate(&self, host: &str) -> Result<Vec<u8>> {
        let target = format!("{host}:{}", self.port);
        let failure = |reason: String| Error::NetworkFailure {
            url: target.clone(),
            reason,
        };

        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| Error::InvalidConfig(format!("invalid host name {host:?}: {e}")))?;
        let config = client_config()?;
        let mut conn =
            ClientConnection::new(config, server_name).map_err(|e| failure(e.to_string()))?;

        tracing::debug!(%host, port = self.port, "probing TLS certificate");
        let mut sock = self.connect(host, &target)?;
        sock.set_read_timeout(Some(self.handshake_timeout))
            .and_then(|()| sock.set_write_timeout(Some(self.handshake_timeout)))
            .map_err(|e| failure(e.to_string()))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut sock).map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                    Error::Timeout(format!("TLS handshake with {target} timed out"))
                }
                _ => failure(format!("TLS handshake failed: {e}")),
            })?;
        }

        conn.peer_certificates()
            .and_then(|chain| chain.first())
            .map(|leaf| leaf.as_ref().to_vec())
            .ok_or_else(|| failure("server presented no certificate".into()))
    }

    /// Compare `host`'s leaf certificate with `expected`.
    ///
    /// An empty `expected` succeeds without connecting.
    pub fn verify_fingerprint(&self, host: &str, expected: &str) -> Result<bool> {
        let Some(expected) = Fingerprint::parse_optional(expected)? else {
            return Ok(true);
        };
        let leaf = self.leaf_certificate(host)?;
        let matched = expected.matches_der(&leaf);
        if !matched {
            tracing::warn!(%host, "TLS certificate does not match pinned fingerprint");
        }
        Ok(matched)
    }

    fn connect(&self, host: &str, target: &str) -> Result<TcpStream> {
        let query = (host.to_owned(), self.port);
        let addrs = resolve_within(target, self.resolve_timeout, move || {
            query.to_socket_addrs().map(Iterator::collect)
        })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(sock) => return Ok(sock),
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Error::Timeout(format!("connecting to {target} timed out"))
            }
            Some(e) => Error::NetworkFailure {
                url: target.to_owned(),
                reason: e.to_string(),
            },
            None => Error::NetworkFailure {
                url: target.to_owned(),
                reason: "host resolved to no addresses".into(),
            },
        })
    }
}

impl CertificateProbe for TlsProbe {
    fn verify_fingerprint(&self, host: &str, expected: &str) -> Result<bool> {
        TlsProbe::verify_fingerprint(self, host, expected)
    }
}

/// Run `lookup` on a helper thread, giving up after `timeout`.
fn resolve_within<F>(target: &str, timeout: Duration, lookup: F) -> Result<Vec<SocketAddr>>
where
    F: FnOnce() -> io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("samlmeta-resolve".into())
        .spawn(move || {
            let _ = tx.send(lookup());
        })
        .map_err(|e| Error::NetworkFailure {
            url: target.to_owned(),
            reason: format!("cannot start resolver: {e}"),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(addrs)) => Ok(addrs),
        Ok(Err(e)) => Err(Error::NetworkFailure {
            url: target.to_owned(),
            reason: format!("cannot resolve host: {e}"),
        }),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::warn!(%target, ?timeout, "DNS lookup abandoned");
            Err(Error::Timeout(format!("resolving {target} timed out")))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::NetworkFailure {
            url: target.to_owned(),
            reason: "resolver thread exited without an answer".into(),
        }),
    }
}

fn client_config() -> Result<Arc<ClientConfig>> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::InvalidConfig(format!("TLS configuration: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
