//! Error types.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a SocketGuard session.
///
/// Every variant other than [`Error::Io`] is fatal for the session: the
/// protocol performs no internal retries and a failed session must be
/// discarded along with its transport.
#[derive(Debug, Error)]
pub enum Error {
    /// Decoder saw a frame type outside the recognized set.
    #[error("unknown message type: {0}")]
    UnknownType(u32),

    /// Frame type is valid but illegal in the current state.
    #[error("unexpected message type: {0}")]
    UnexpectedMessage(u32),

    /// AEAD open failure, DH failure, or invalid payload during handshake.
    #[error("handshake failed")]
    HandshakeFailed,

    /// Version ranges advertised by the two endpoints do not intersect.
    #[error("no mutually supported protocol version")]
    VersionMismatch,

    /// Consumed rekey that failed to open, or whose timestamp did not
    /// strictly exceed the last accepted one.
    #[error("rekey failed")]
    RekeyFailed,

    /// Receiving key is older than the reject-after limit.
    #[error("receiving key expired")]
    KeyExpired,

    /// AEAD open failure on a data frame (invalid tag or corrupted).
    #[error("data decryption failed (invalid tag or corrupted)")]
    DecryptFailed,

    /// Invalid session configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error from the underlying transport, propagated as-is.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        match err {
            Error::Io(e) => e,
            Error::Config(_) => std::io::Error::new(ErrorKind::InvalidInput, err),
            _ => std::io::Error::new(ErrorKind::InvalidData, err),
        }
    }
}
