//! Error types for the Cloak handshake engine.

use thiserror::Error;

/// Result type alias for Cloak operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, authenticating or answering a
/// camouflaged handshake.
#[derive(Error, Debug)]
pub enum Error {
    /// First packet is not (or is a malformed) ClientHello
    #[error("non (or malformed) ClientHello")]
    BadClientHello,

    /// Well-formed TLS that carries no valid tunnel credentials
    #[error("TLS but non-Cloak ClientHello")]
    NotCloak,

    /// Authenticated client asked for a proxy method we do not serve
    #[error("invalid proxy method")]
    BadProxyMethod,

    /// Any out-of-bounds read inside a ClientHello
    #[error("malformed ClientHello")]
    MalformedClientHello,

    /// Handshake type byte is not ClientHello
    #[error("not a ClientHello")]
    NotClientHello,

    /// Declared handshake body length disagrees with the bytes present
    #[error("hello length doesn't match: declared {declared}, actual {actual}")]
    HelloLengthMismatch {
        /// Length from the handshake header
        declared: usize,
        /// Bytes following the header
        actual: usize,
    },

    /// Overrun while walking the extension block
    #[error("malformed extensions")]
    MalformedExtensions,

    /// Overrun while walking a key_share extension body
    #[error("malformed key_share")]
    MalformedKeyShare,

    /// x25519 key share present but with the wrong size
    #[error("key share length should be 32, instead of {0}")]
    KeyShareLength(usize),

    /// key_share carries no x25519 entry
    #[error("x25519 does not exist")]
    X25519Missing,

    /// Credential check failed inside an authenticator
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Invalid message format
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Connection timeout
    #[error("connection timeout after {0}ms")]
    Timeout(u64),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(String),
}

impl Error {
    /// Create a new authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Error::Authentication(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Check if this error is one of the three handshake rejections.
    ///
    /// Connections failing with one of these must be dropped without any
    /// reply, like a server that never answers garbage.
    pub fn is_handshake_rejection(&self) -> bool {
        matches!(
            self,
            Error::BadClientHello | Error::NotCloak | Error::BadProxyMethod
        )
    }

    /// Check if this error came from the ClientHello parsing routines
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            Error::MalformedClientHello
                | Error::NotClientHello
                | Error::HelloLengthMismatch { .. }
                | Error::MalformedExtensions
                | Error::MalformedKeyShare
                | Error::KeyShareLength(_)
                | Error::X25519Missing
        )
    }
}
