//! Cloak handshake: authenticate a ClientHello and answer it in disguise.
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |  ClientHello                           |
//!   |   random     = nonce | uid ^ tag       |
//!   |   session_id = sealed metadata         |
//!   |   key_share  = ephemeral x25519        |
//!   |--------------------------------------->|  parse, authenticate,
//!   |                                        |  check proxy method
//!   |                                        |
//!   |  ServerHello + ChangeCipherSpec        |
//!   |   random     = session_key ^ secret    |  sent once the data plane
//!   |<---------------------------------------|  has picked a session key
//!   |                                        |
//!   |============ data plane ================|
//! ```
//!
//! A handshake that fails any step gets no reply at all.

mod client;
pub(crate) mod config;
mod metadata;
mod prepare;
mod touchstone;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::crypto::SharedSecret;
use crate::error::Result;
use crate::tls::ClientHello;

pub use client::{BuiltClientHello, ClientHelloBuilder, ClientSession, CloakClient};
pub use config::ClientConfig;
pub use metadata::SessionMetadata;
pub use prepare::{prepare_connection, PendingReply, PreparedConnection};
pub use touchstone::TouchStone;

/// Size of the client UID hidden in the ClientHello random
pub const UID_SIZE: usize = 8;

/// Bytes of the ClientHello random used as the per-handshake nonce
pub const NONCE_SIZE: usize = 24;

/// Size of the sealed metadata carried in the ClientHello session id
pub const SEALED_METADATA_SIZE: usize = 32;

/// What a successful authentication yields.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Client identity
    pub client_id: Vec<u8>,
    /// Session the client wants to open or join
    pub session_id: u32,
    /// Downstream proxy method requested
    pub proxy_method: String,
    /// Data plane encryption selector
    pub encryption_method: u8,
    /// Mask for the ServerHello random field
    pub shared_secret: SharedSecret,
}

/// Decides whether a ClientHello belongs to a legitimate client.
///
/// Errors carry the reason for internal logging only; callers of
/// [`prepare_connection`] see a uniform [`crate::Error::NotCloak`].
pub trait Authenticator: Send + Sync {
    /// Verify the ClientHello and derive the shared secret.
    fn authenticate(&self, client_hello: &ClientHello, state: &ServerState) -> Result<Credentials>;
}

/// Registry of proxy methods the server can hand sessions to.
///
/// Maps a method name to the backend address serving it. Can be changed
/// while the server runs.
#[derive(Debug, Default)]
pub struct ProxyBook {
    methods: RwLock<HashMap<String, String>>,
}

impl ProxyBook {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a proxy method.
    pub fn insert(&self, method: impl Into<String>, backend: impl Into<String>) {
        self.methods.write().insert(method.into(), backend.into());
    }

    /// Remove a proxy method.
    pub fn remove(&self, method: &str) -> Option<String> {
        self.methods.write().remove(method)
    }

    /// Whether `method` is served.
    pub fn contains(&self, method: &str) -> bool {
        self.methods.read().contains_key(method)
    }

    /// Backend address for `method`.
    pub fn backend(&self, method: &str) -> Option<String> {
        self.methods.read().get(method).cloned()
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    /// Whether no method is registered.
    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }
}

impl<S: Into<String>, B: Into<String>> FromIterator<(S, B)> for ProxyBook {
    fn from_iter<I: IntoIterator<Item = (S, B)>>(iter: I) -> Self {
        let methods = iter
            .into_iter()
            .map(|(s, b)| (s.into(), b.into()))
            .collect();
        Self {
            methods: RwLock::new(methods),
        }
    }
}

/// Server-side state a handshake is checked against.
pub struct ServerState {
    /// Supported proxy methods
    pub proxy_book: ProxyBook,
    /// Credential check
    pub authenticator: Arc<dyn Authenticator>,
}

impl ServerState {
    /// Create state from a registry and an authenticator.
    pub fn new(proxy_book: ProxyBook, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            proxy_book,
            authenticator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_book() {
        let book: ProxyBook = [("shadowsocks", "127.0.0.1:8388")].into_iter().collect();
        assert!(book.contains("shadowsocks"));
        assert!(!book.contains("openvpn"));

        book.insert("openvpn", "127.0.0.1:1194");
        assert_eq!(book.len(), 2);
        assert_eq!(book.backend("openvpn").as_deref(), Some("127.0.0.1:1194"));

        assert!(book.remove("shadowsocks").is_some());
        assert!(!book.contains("shadowsocks"));
        assert!(!book.is_empty());
    }

    #[test]
    fn test_constants_fit_random() {
        assert_eq!(NONCE_SIZE + UID_SIZE, crate::tls::RANDOM_SIZE);
    }
}
