//! Fixed-size secrets carried through the handshake.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::kdf::{ct_eq, xor_bytes};
use crate::crypto::KEY_SIZE;

/// Secret both ends derive during authentication.
///
/// Used only as the XOR mask over the ServerHello random field. Zeroized on
/// drop and redacted from `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; KEY_SIZE]);

impl SharedSecret {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Mask a session key for the ServerHello random field.
    pub fn mask(&self, session_key: &SessionKey) -> [u8; KEY_SIZE] {
        xor_bytes(session_key.as_bytes(), &self.0)
    }

    /// Recover a session key from a masked random field.
    pub fn unmask(&self, masked: &[u8; KEY_SIZE]) -> SessionKey {
        SessionKey(xor_bytes(masked, &self.0))
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl Eq for SharedSecret {}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Per-connection key for the data plane, delivered to the client inside
/// the ServerHello random field.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random session key.
    pub fn random() -> Self {
        Self(crate::crypto::random_bytes())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_unmask() {
        let secret = SharedSecret::from_bytes([0xa5; 32]);
        let key = SessionKey::random();

        let masked = secret.mask(&key);
        assert_ne!(&masked, key.as_bytes());
        assert_eq!(secret.unmask(&masked), key);
    }

    #[test]
    fn test_equality_compares_every_byte() {
        let mut last_differs = [0x11; 32];
        last_differs[31] ^= 0x80;

        assert_eq!(SessionKey::from_bytes([0x11; 32]), SessionKey::from_bytes([0x11; 32]));
        assert_ne!(SessionKey::from_bytes([0x11; 32]), SessionKey::from_bytes(last_differs));
        assert_eq!(SharedSecret::from_bytes([0x22; 32]), SharedSecret::from_bytes([0x22; 32]));
        assert_ne!(SharedSecret::from_bytes([0x11; 32]), SharedSecret::from_bytes(last_differs));
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = SharedSecret::from_bytes([0x42; 32]);
        let key = SessionKey::from_bytes([0x42; 32]);
        assert_eq!(format!("{:?}", secret), "SharedSecret(..)");
        assert_eq!(format!("{:?}", key), "SessionKey(..)");
    }
}
