//! Transport layer: address parsing, timeout-bounded connect, and the
//! stream wrapper over TCP and unix-domain sockets.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{FcgiError, Result};

/// Default FastCGI responder port (PHP-FPM convention).
pub const DEFAULT_PORT: u16 = 9000;

/// Default connect and read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// A FastCGI backend address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp {
        host: String,
        port: u16,
    },
    #[cfg(unix)]
    Unix {
        path: std::path::PathBuf,
    },
}

impl Address {
    /// Parse `tcp://host:port`, bare `host:port`, bare `host` (port 9000),
    /// or `unix://path`.
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(path) = raw.strip_prefix("unix://") {
            #[cfg(unix)]
            {
                return Ok(Self::Unix {
                    path: std::path::PathBuf::from(path),
                });
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                return Err(FcgiError::InvalidArgument(
                    "unix-domain addresses are not supported on this platform".into(),
                ));
            }
        }
        let raw = raw.strip_prefix("tcp://").unwrap_or(raw);
        if raw.is_empty() {
            return Err(FcgiError::InvalidArgument("empty address".into()));
        }
        match raw.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    FcgiError::InvalidArgument(format!("invalid port in address: {raw}"))
                })?;
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Self::Tcp {
                host: raw.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            #[cfg(unix)]
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Connection parameters: address plus connect and read/write timeouts.
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct Connection {
    address: Address,
    connect_timeout: Duration,
    read_write_timeout: Duration,
}

impl Connection {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            connect_timeout: DEFAULT_TIMEOUT,
            read_write_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// TCP connection to `host:port`.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Address::Tcp {
            host: host.into(),
            port,
        })
    }

    /// Unix-domain socket connection.
    #[cfg(unix)]
    pub fn unix(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Address::Unix { path: path.into() })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_write_timeout(mut self, timeout: Duration) -> Self {
        self.read_write_timeout = timeout;
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_write_timeout(&self) -> Duration {
        self.read_write_timeout
    }

    /// Open a stream to the configured address, bounded by the connect
    /// timeout.
    pub async fn connect(&self) -> Result<FcgiStream> {
        let stream = match &self.address {
            Address::Tcp { host, port } => {
                let addr = format!("{host}:{port}");
                let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
                    .await
                    .map_err(|_| FcgiError::Timeout(format!("connect to {addr} timed out")))?
                    .map_err(|e| {
                        FcgiError::Connection(format!("failed to connect to {addr}: {e}"))
                    })?;
                let _ = stream.set_nodelay(true);
                FcgiStream::Tcp(stream)
            }
            #[cfg(unix)]
            Address::Unix { path } => {
                let stream = timeout(self.connect_timeout, UnixStream::connect(path))
                    .await
                    .map_err(|_| {
                        FcgiError::Timeout(format!("connect to {} timed out", path.display()))
                    })?
                    .map_err(|e| {
                        FcgiError::Connection(format!(
                            "failed to connect to {}: {e}",
                            path.display()
                        ))
                    })?;
                FcgiStream::Unix(stream)
            }
        };
        debug!(address = %self.address, "fastcgi transport connected");
        Ok(stream)
    }
}

/// Live byte stream to a responder.
#[derive(Debug)]
pub enum FcgiStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl FcgiStream {
    /// Best-effort graceful shutdown. Tolerant of already-closed handles.
    pub async fn disconnect(&mut self) {
        let _ = match self {
            Self::Tcp(s) => s.shutdown().await,
            #[cfg(unix)]
            Self::Unix(s) => s.shutdown().await,
        };
    }
}

impl AsyncRead for FcgiStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for FcgiStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
