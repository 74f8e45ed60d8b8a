use thiserror::Error;

/// Errors surfaced by the FastCGI engine, keyed by the phase that failed.
///
/// The engine performs no retries of its own; every failure is reported to
/// the immediate caller and the owning session is torn down.
#[derive(Debug, Error)]
pub enum FcgiError {
    /// The transport could not be established, or a session was reused
    /// while still driving a request.
    #[error("connection error: {0}")]
    Connection(String),

    /// Writing the request stream failed, or the responder rejected the
    /// request at the protocol level (CANT_MPX_CONN, OVERLOADED,
    /// UNKNOWN_ROLE).
    #[error("write error: {0}")]
    Write(String),

    /// The response stream was malformed, truncated, or carried an unknown
    /// protocol status.
    #[error("read error: {0}")]
    Read(String),

    /// A connect, write, or read exceeded its configured timeout. Never
    /// conflated with a clean end of stream.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Malformed input to a codec or an out-of-range identifier.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FcgiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FcgiError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, FcgiError>;
