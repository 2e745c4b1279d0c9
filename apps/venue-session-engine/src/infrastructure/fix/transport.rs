//! Socket Transport
//!
//! Opens the TCP connection (optionally upgraded to TLS) and splits it into a
//! framed [`TransportReader`] and a guarded [`TransportWriter`].
//!
//! # TLS
//!
//! - rustls with the ring provider, TLS 1.2 minimum
//! - server verified against webpki roots plus an optional CA bundle
//! - client certificate and key loaded from PEM files
//!
//! [`TlsMode::Disabled`] connects in plaintext and exists for local venue
//! simulators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::FramedRead;

use super::codec::{self, CodecError, FixFrameCodec, WireMessage};

// =============================================================================
// Configuration
// =============================================================================

/// Certificate material for a TLS connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Extra CA bundle (PEM) trusted in addition to the webpki roots.
    pub ca_file: Option<PathBuf>,
    /// Client certificate chain (PEM).
    pub cert_file: Option<PathBuf>,
    /// Client private key (PEM).
    pub key_file: Option<PathBuf>,
    /// SNI / verification name when it differs from the host.
    pub server_name: Option<String>,
}

/// Whether the socket is wrapped in TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS with the given certificate material.
    Enabled(TlsSettings),
    /// Plain TCP.
    Disabled,
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Venue host.
    pub host: String,
    /// Venue port.
    pub port: u16,
    /// TLS mode.
    pub tls: TlsMode,
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on a single frame write.
    pub write_timeout: Duration,
}

impl TransportConfig {
    /// Plaintext config with default timeouts.
    #[must_use]
    pub fn plaintext(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: TlsMode::Disabled,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure to establish a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// TCP connect failed.
    #[error("connection to {addr} failed: {source}")]
    Io {
        /// Target address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Connect or handshake did not finish in time.
    #[error("connection to {0} timed out")]
    Timeout(String),

    /// A certificate or key file is missing or unreadable.
    #[error("certificate file {path}: {reason}")]
    Certificate {
        /// File that failed to load.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Only one of client certificate and key was configured.
    #[error("client certificate and key must be configured together")]
    IncompleteIdentity,

    /// Host is not a valid TLS server name.
    #[error("invalid TLS server name '{0}'")]
    InvalidServerName(String),

    /// rustls rejected the configuration.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// TLS handshake failed.
    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        /// Target address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure to write a frame.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// No writable socket.
    #[error("not connected")]
    NotConnected,

    /// Write did not finish in time.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// Socket write failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Transport
// =============================================================================

trait IoStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> IoStream for T {}

type BoxedStream = Box<dyn IoStream>;

/// Connection factory.
#[derive(Debug, Clone, Copy)]
pub struct Transport;

impl Transport {
    /// Open a connection and split it into reader and writer halves.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError` if the TCP connect, certificate loading, or TLS
    /// handshake fails, or if either exceeds `connect_timeout`.
    pub async fn connect(
        config: &TransportConfig,
    ) -> Result<(TransportReader, TransportWriter), ConnectError> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = tokio::time::timeout(config.connect_timeout, Self::open(config, &addr))
            .await
            .map_err(|_| ConnectError::Timeout(addr.clone()))??;

        let (read, write) = tokio::io::split(stream);
        let alive = Arc::new(AtomicBool::new(true));

        tracing::info!(
            addr = %addr,
            tls = matches!(config.tls, TlsMode::Enabled(_)),
            "Transport connected"
        );

        Ok((
            TransportReader {
                frames: FramedRead::new(read, FixFrameCodec::new()),
                alive: Arc::clone(&alive),
            },
            TransportWriter {
                write,
                alive,
                write_timeout: config.write_timeout,
            },
        ))
    }

    async fn open(config: &TransportConfig, addr: &str) -> Result<BoxedStream, ConnectError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|source| ConnectError::Io {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        match &config.tls {
            TlsMode::Disabled => {
                tracing::warn!(addr = %addr, "TLS disabled, connecting in plaintext");
                Ok(Box::new(tcp))
            }
            TlsMode::Enabled(settings) => {
                let connector = tls_connector(settings)?;
                let name = settings
                    .server_name
                    .clone()
                    .unwrap_or_else(|| config.host.clone());
                let server_name = ServerName::try_from(name.clone())
                    .map_err(|_| ConnectError::InvalidServerName(name))?;
                let tls = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|source| ConnectError::Handshake {
                        addr: addr.to_string(),
                        source,
                    })?;
                Ok(Box::new(tls))
            }
        }
    }
}

fn tls_connector(settings: &TlsSettings) -> Result<TlsConnector, ConnectError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    if let Some(ca_file) = &settings.ca_file {
        for cert in load_certs(ca_file)? {
            roots.add(cert)?;
        }
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_root_certificates(roots);

    let config = match (&settings.cert_file, &settings.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let chain = load_certs(cert_file)?;
            let key = PrivateKeyDer::from_pem_file(key_file).map_err(|e| certificate_error(key_file, &e))?;
            builder.with_client_auth_cert(chain, key)?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => return Err(ConnectError::IncompleteIdentity),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConnectError> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| certificate_error(path, &e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| certificate_error(path, &e))?;
    if certs.is_empty() {
        return Err(ConnectError::Certificate {
            path: path.to_path_buf(),
            reason: "no certificates found".to_string(),
        });
    }
    Ok(certs)
}

fn certificate_error(path: &Path, err: &rustls::pki_types::pem::Error) -> ConnectError {
    ConnectError::Certificate {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

// =============================================================================
// Reader / Writer Halves
// =============================================================================

/// Inbound half: yields decoded messages.
pub struct TransportReader {
    frames: FramedRead<ReadHalf<BoxedStream>, FixFrameCodec>,
    alive: Arc<AtomicBool>,
}

impl std::fmt::Debug for TransportReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportReader")
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TransportReader {
    /// Next well-formed message.
    ///
    /// Malformed frames are logged and skipped. Returns `Ok(None)` when the
    /// peer closes the connection. Either terminal outcome marks the
    /// transport dead.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that ended the connection.
    pub async fn recv(&mut self) -> Result<Option<WireMessage>, std::io::Error> {
        loop {
            match self.frames.next().await {
                Some(Ok(frame)) => match codec::decode(&frame) {
                    Ok(msg) => return Ok(Some(msg)),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            frame = %String::from_utf8_lossy(&frame).replace('\x01', "|"),
                            "Dropping malformed inbound frame"
                        );
                        crate::infrastructure::metrics::record_malformed_frame();
                    }
                },
                Some(Err(CodecError::Io(e))) => {
                    self.alive.store(false, Ordering::SeqCst);
                    return Err(e);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Frame decoder error");
                }
                None => {
                    self.alive.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
            }
        }
    }
}

/// Outbound half.
pub struct TransportWriter {
    write: WriteHalf<BoxedStream>,
    alive: Arc<AtomicBool>,
    write_timeout: Duration,
}

impl std::fmt::Debug for TransportWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportWriter")
            .field("alive", &self.is_alive())
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl TransportWriter {
    /// Whether the connection is still usable.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Write one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns `SendError::NotConnected` without writing if the connection is
    /// already dead. A failed or timed-out write marks it dead.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::NotConnected);
        }

        let write = async {
            self.write.write_all(frame).await?;
            self.write.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.alive.store(false, Ordering::SeqCst);
                Err(SendError::Io(e))
            }
            Err(_) => {
                self.alive.store(false, Ordering::SeqCst);
                Err(SendError::Timeout(self.write_timeout))
            }
        }
    }

    /// Close the write side. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            match tokio::time::timeout(self.write_timeout, self.write.shutdown()).await {
                Ok(Ok(())) => tracing::debug!("Transport shut down"),
                Ok(Err(e)) => tracing::debug!(error = %e, "Transport shutdown error"),
                Err(_) => tracing::debug!("Transport shutdown timed out"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fix::codec::{OutboundHeader, WireMessageBuilder};
    use crate::infrastructure::fix::tags::MsgType;
    use chrono::Utc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn heartbeat(seq: u64) -> bytes::Bytes {
        WireMessageBuilder::new(MsgType::Heartbeat)
            .build(&OutboundHeader {
                sender_comp_id: "A",
                target_comp_id: "B",
                seq_num: seq,
                sending_time: Utc::now(),
                poss_dup: false,
            })
            .encode()
    }

    #[tokio::test]
    async fn plaintext_round_trip_skips_malformed_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01").await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let (mut reader, mut writer) = Transport::connect(&TransportConfig::plaintext("127.0.0.1", port))
            .await
            .unwrap();
        writer.send(&heartbeat(3)).await.unwrap();

        let echoed = reader.recv().await.unwrap().unwrap();
        assert_eq!(echoed.seq_num(), Some(3));

        server.await.unwrap();
        assert!(reader.recv().await.unwrap().is_none());
        assert!(!writer.is_alive());
        assert!(matches!(writer.send(&heartbeat(4)).await, Err(SendError::NotConnected)));
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Transport::connect(&TransportConfig::plaintext("127.0.0.1", port))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Io { .. }));
    }

    #[test]
    fn missing_client_certificate_file_is_reported() {
        let settings = TlsSettings {
            cert_file: Some(PathBuf::from("/nonexistent/client.crt")),
            key_file: Some(PathBuf::from("/nonexistent/client.key")),
            ..TlsSettings::default()
        };
        let err = tls_connector(&settings).err().unwrap();
        assert!(matches!(err, ConnectError::Certificate { .. }));
    }

    #[test]
    fn certificate_without_key_is_rejected() {
        let settings = TlsSettings {
            cert_file: Some(PathBuf::from("/etc/client.crt")),
            ..TlsSettings::default()
        };
        assert!(matches!(
            tls_connector(&settings),
            Err(ConnectError::IncompleteIdentity)
        ));
    }

    #[test]
    fn default_roots_build_a_connector() {
        assert!(tls_connector(&TlsSettings::default()).is_ok());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let (_reader, mut writer) = Transport::connect(&TransportConfig::plaintext("127.0.0.1", port))
            .await
            .unwrap();
        let _peer = accept.await.unwrap().unwrap();

        writer.shutdown().await;
        writer.shutdown().await;
        assert!(!writer.is_alive());
    }
}
