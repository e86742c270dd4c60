//! X25519 key agreement primitives.
//!
//! Thin wrappers around `x25519-dalek`. The server's static key and the
//! client's ephemeral key meet in the authenticator; the handshake reply
//! itself never performs key exchange.

use x25519_dalek::{
    EphemeralSecret as DalekEphemeral, PublicKey as DalekPublic,
    SharedSecret as DalekShared, StaticSecret as DalekStatic,
};
use zeroize::ZeroizeOnDrop;

use crate::crypto::PUBLIC_KEY_SIZE;

/// An ephemeral (single-use) X25519 secret key.
///
/// Clients create one per handshake and advertise its public half in the
/// ClientHello key_share extension.
pub struct EphemeralSecret(DalekEphemeral);

impl EphemeralSecret {
    /// Generate a new random ephemeral secret.
    pub fn random() -> Self {
        Self(DalekEphemeral::random_from_rng(rand::thread_rng()))
    }

    /// Perform X25519 Diffie-Hellman key agreement.
    pub fn diffie_hellman(self, their_public: &PublicKey) -> DhSecret {
        DhSecret(self.0.diffie_hellman(&their_public.0))
    }
}

impl From<&EphemeralSecret> for PublicKey {
    fn from(secret: &EphemeralSecret) -> Self {
        PublicKey(DalekPublic::from(&secret.0))
    }
}

/// The server's long-term X25519 secret key.
///
/// Automatically zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct StaticSecret(DalekStatic);

impl StaticSecret {
    /// Generate a new random static secret.
    pub fn random() -> Self {
        Self(DalekStatic::random_from_rng(rand::thread_rng()))
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(DalekStatic::from(bytes))
    }

    /// Perform X25519 Diffie-Hellman key agreement.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> DhSecret {
        DhSecret(self.0.diffie_hellman(&their_public.0))
    }

    /// Export the secret key bytes, for writing configuration files.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<&StaticSecret> for PublicKey {
    fn from(secret: &StaticSecret) -> Self {
        PublicKey(DalekPublic::from(&secret.0))
    }
}

/// An X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(DalekPublic);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(DalekPublic::from(bytes))
    }

    /// Get the raw bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }

    /// Convert to raw bytes.
    pub fn to_bytes(self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }
}

/// Raw output of an X25519 key agreement.
///
/// Feed it through HKDF before use; see [`crate::crypto::kdf`].
pub struct DhSecret(DalekShared);

impl DhSecret {
    /// Get the raw agreement bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Whether the peer sent a low-order point and forced an all-zero output.
    pub fn was_contributory(&self) -> bool {
        self.0.was_contributory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_key_exchange() {
        let server_static = StaticSecret::random();
        let server_public = PublicKey::from(&server_static);

        let client_ephemeral = EphemeralSecret::random();
        let client_public = PublicKey::from(&client_ephemeral);

        let client_shared = client_ephemeral.diffie_hellman(&server_public);
        let server_shared = server_static.diffie_hellman(&client_public);

        assert_eq!(client_shared.as_bytes(), server_shared.as_bytes());
        assert!(server_shared.was_contributory());
    }

    #[test]
    fn test_low_order_point_is_not_contributory() {
        let server_static = StaticSecret::random();
        let shared = server_static.diffie_hellman(&PublicKey::from_bytes([0u8; 32]));
        assert!(!shared.was_contributory());
    }

    #[test]
    fn test_static_secret_serialization() {
        let secret1 = StaticSecret::random();
        let secret2 = StaticSecret::from_bytes(secret1.to_bytes());

        assert_eq!(PublicKey::from(&secret1), PublicKey::from(&secret2));
    }
}
