//! Connection metadata sealed into the ClientHello session id.
//!
//! Layout before masking (32 bytes):
//!
//! ```text
//! session_id(4) | encryption_method(1) | method_len(1) | proxy_method(18) | tag(8)
//! ```
//!
//! The tag is an HMAC over the nonce and the first 24 bytes. The whole block
//! is XORed with an HKDF keystream bound to the nonce, so on the wire it is
//! indistinguishable from a random TLS session id.

use crate::cloak::SEALED_METADATA_SIZE;
use crate::crypto::kdf::{compute_auth_tag, metadata_keystream, verify_auth_tag, xor_bytes};
use crate::crypto::AUTH_TAG_SIZE;
use crate::error::{Error, Result};
use crate::tls::codec::be_u32;

/// Longest proxy method name that fits the sealed block
pub const MAX_PROXY_METHOD_LEN: usize = 18;

const BODY_LEN: usize = SEALED_METADATA_SIZE - AUTH_TAG_SIZE;

/// What a client asks for when it opens a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    /// Session to open or join
    pub session_id: u32,
    /// Data plane encryption selector
    pub encryption_method: u8,
    /// Downstream proxy method
    pub proxy_method: String,
}

impl SessionMetadata {
    /// Create metadata, rejecting method names that do not fit.
    pub fn new(session_id: u32, encryption_method: u8, proxy_method: impl Into<String>) -> Result<Self> {
        let proxy_method = proxy_method.into();
        if proxy_method.len() > MAX_PROXY_METHOD_LEN {
            return Err(Error::config(format!(
                "proxy method longer than {} bytes",
                MAX_PROXY_METHOD_LEN
            )));
        }
        Ok(Self {
            session_id,
            encryption_method,
            proxy_method,
        })
    }

    /// Seal into a 32-byte session id.
    pub fn seal(&self, dh: &[u8; 32], nonce: &[u8]) -> Result<[u8; SEALED_METADATA_SIZE]> {
        let method = self.proxy_method.as_bytes();
        if method.len() > MAX_PROXY_METHOD_LEN {
            return Err(Error::config("proxy method too long"));
        }

        let mut plain = [0u8; SEALED_METADATA_SIZE];
        plain[..4].copy_from_slice(&self.session_id.to_be_bytes());
        plain[4] = self.encryption_method;
        plain[5] = method.len() as u8;
        plain[6..6 + method.len()].copy_from_slice(method);
        let tag = compute_auth_tag(dh, &[nonce, &plain[..BODY_LEN]]);
        plain[BODY_LEN..].copy_from_slice(&tag);

        let keystream = metadata_keystream(dh, nonce)?;
        Ok(xor_bytes(&plain, &keystream))
    }

    /// Unmask and verify a sealed session id.
    pub fn open(sealed: &[u8; SEALED_METADATA_SIZE], dh: &[u8; 32], nonce: &[u8]) -> Result<Self> {
        let keystream = metadata_keystream(dh, nonce)?;
        let plain = xor_bytes(sealed, &keystream);

        let mut tag = [0u8; AUTH_TAG_SIZE];
        tag.copy_from_slice(&plain[BODY_LEN..]);
        if !verify_auth_tag(dh, &[nonce, &plain[..BODY_LEN]], &tag) {
            return Err(Error::authentication("metadata tag mismatch"));
        }

        let session_id = be_u32(&plain).ok_or_else(|| Error::authentication("metadata truncated"))?;
        let method_len = plain[5] as usize;
        if method_len > MAX_PROXY_METHOD_LEN {
            return Err(Error::authentication("proxy method length out of range"));
        }
        let proxy_method = std::str::from_utf8(&plain[6..6 + method_len])
            .map_err(|_| Error::authentication("proxy method is not UTF-8"))?
            .to_string();

        Ok(Self {
            session_id,
            encryption_method: plain[4],
            proxy_method,
        })
    }
}
