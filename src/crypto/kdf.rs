//! Key Derivation Functions.
//!
//! HKDF-SHA256 turns an X25519 agreement into the handshake's shared secret
//! and metadata keystream; HMAC-SHA256 produces the short auth tags hidden in
//! the ClientHello.

use hkdf::Hkdf as HkdfImpl;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::crypto::{SharedSecret, AUTH_TAG_SIZE, KEY_SIZE};
use crate::error::{Error, Result};

/// Salt for every HKDF extraction in the handshake
const HKDF_SALT: &[u8] = b"cloak_v1";

/// HKDF key derivation using SHA-256.
pub struct Hkdf {
    prk: HkdfImpl<Sha256>,
}

impl Hkdf {
    /// Create a new HKDF instance from input keying material.
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        Self {
            prk: HkdfImpl::new(salt, ikm),
        }
    }

    /// Expand to a fixed-size array.
    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N]> {
        let mut okm = [0u8; N];
        self.prk
            .expand(info, &mut okm)
            .map_err(|_| Error::crypto("HKDF expansion failed"))?;
        Ok(okm)
    }
}

/// Derive the handshake shared secret from an X25519 agreement.
pub fn derive_shared_secret(dh: &[u8; 32]) -> Result<SharedSecret> {
    let hkdf = Hkdf::new(Some(HKDF_SALT), dh);
    Ok(SharedSecret::from_bytes(hkdf.expand_fixed::<KEY_SIZE>(b"shared_secret")?))
}

/// Derive the keystream that masks the metadata sealed in a session id.
///
/// Bound to the client nonce so two handshakes never reuse a keystream.
pub fn metadata_keystream<const N: usize>(dh: &[u8; 32], nonce: &[u8]) -> Result<[u8; N]> {
    let hkdf = Hkdf::new(Some(HKDF_SALT), dh);
    hkdf.expand_fixed(&[b"metadata".as_slice(), nonce].concat())
}

/// Compute an HMAC-SHA256 authentication tag over `parts`.
///
/// Returns the first 8 bytes of HMAC output.
pub fn compute_auth_tag(key: &[u8], parts: &[&[u8]]) -> [u8; AUTH_TAG_SIZE] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    let result = mac.finalize().into_bytes();

    let mut tag = [0u8; AUTH_TAG_SIZE];
    tag.copy_from_slice(&result[..AUTH_TAG_SIZE]);
    tag
}

/// Verify an authentication tag in constant time.
pub fn verify_auth_tag(key: &[u8], parts: &[&[u8]], expected_tag: &[u8; AUTH_TAG_SIZE]) -> bool {
    ct_eq(&compute_auth_tag(key, parts), expected_tag)
}

/// Compare two byte arrays without short-circuiting on the first mismatch.
pub fn ct_eq<const N: usize>(a: &[u8; N], b: &[u8; N]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// XOR two byte arrays of equal length.
pub fn xor_bytes<const N: usize>(a: &[u8; N], b: &[u8; N]) -> [u8; N] {
    let mut result = [0u8; N];
    for i in 0..N {
        result[i] = a[i] ^ b[i];
    }
    result
}
