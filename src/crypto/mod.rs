//! Cryptographic primitives for the handshake.
//!
//! This module provides:
//! - X25519 key agreement between client key share and server static key
//! - HKDF derivation of the shared secret and metadata keystream
//! - HMAC-SHA256 auth tags
//! - Key and nonce generation from the OS entropy source
//!
//! All secret material is zeroized on drop.

use rand::RngCore;
use rand_core::OsRng;

pub mod kdf;
mod keys;
mod secret;

pub use kdf::Hkdf;
pub use keys::{DhSecret, EphemeralSecret, PublicKey, StaticSecret};
pub use secret::{SessionKey, SharedSecret};

/// Size of symmetric keys and shared secrets in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of truncated HMAC-SHA256 auth tags
pub const AUTH_TAG_SIZE: usize = 8;

/// Fill an array from the OS entropy source.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}
