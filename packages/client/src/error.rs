//! Error types for the chat client.

use chatrelay_shared::codec::CodecError;
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Username is already in use
    #[error("Username '{0}' is already taken")]
    NameTaken(String),

    /// The server closed the connection during the handshake
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
