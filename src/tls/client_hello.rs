//! ClientHello parsing.

use bytes::Bytes;

use crate::crypto::PUBLIC_KEY_SIZE;
use crate::error::{Error, Result};
use crate::tls::codec::{Malformed, Reader};
use crate::tls::extensions::{parse_extensions, Extensions};
use crate::tls::key_share::parse_key_share;
use crate::tls::record::peel_record;
use crate::tls::{ExtensionType, HandshakeType, RANDOM_SIZE};

/// A parsed ClientHello handshake message.
///
/// Built once per incoming connection and read-only afterwards. Variable
/// length fields are zero-copy views into one buffer holding the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    handshake_type: u8,
    length: usize,
    client_version: [u8; 2],
    random: [u8; RANDOM_SIZE],
    session_id: Bytes,
    cipher_suites: Bytes,
    compression_methods: Bytes,
    extensions_len: usize,
    extensions: Extensions,
}

impl ClientHello {
    /// Parse a ClientHello from the raw first packet, record header included.
    ///
    /// The 5-byte record header is skipped without inspection. Fails with
    /// [`Error::NotClientHello`] when the handshake type is wrong and with
    /// [`Error::HelloLengthMismatch`] when the declared body length differs
    /// from what is actually present. Every other short read is
    /// [`Error::MalformedClientHello`] or [`Error::MalformedExtensions`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let handshake = peel_record(data)?;
        let mut reader = Reader::new(Bytes::copy_from_slice(handshake), Malformed::ClientHello);

        let handshake_type = reader.u8()?;
        if handshake_type != HandshakeType::ClientHello as u8 {
            return Err(Error::NotClientHello);
        }

        let length = reader.u24()? as usize;
        if length != reader.remaining() {
            return Err(Error::HelloLengthMismatch {
                declared: length,
                actual: reader.remaining(),
            });
        }

        let client_version = reader.array()?;
        let random = reader.array()?;
        let session_id = reader.vec_u8()?;
        let cipher_suites = reader.vec_u16()?;
        let compression_methods = reader.vec_u8()?;
        let extensions_len = reader.u16()? as usize;
        let extensions = parse_extensions(reader.rest())?;

        Ok(Self {
            handshake_type,
            length,
            client_version,
            random,
            session_id,
            cipher_suites,
            compression_methods,
            extensions_len,
            extensions,
        })
    }

    /// Handshake type byte (always ClientHello).
    pub fn handshake_type(&self) -> u8 {
        self.handshake_type
    }

    /// Declared handshake body length.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Legacy client version.
    pub fn client_version(&self) -> [u8; 2] {
        self.client_version
    }

    /// Client random.
    pub fn random(&self) -> &[u8; RANDOM_SIZE] {
        &self.random
    }

    /// Legacy session id (0 to 255 bytes).
    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Raw cipher suite list.
    pub fn cipher_suites(&self) -> &[u8] {
        &self.cipher_suites
    }

    /// Raw compression method list.
    pub fn compression_methods(&self) -> &[u8] {
        &self.compression_methods
    }

    /// Extensions length as declared on the wire.
    pub fn extensions_len(&self) -> usize {
        self.extensions_len
    }

    /// All extensions keyed by type tag.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Body of one extension, if present.
    pub fn extension(&self, typ: ExtensionType) -> Option<&Bytes> {
        self.extensions.get(&(typ as u16))
    }

    /// The client's x25519 public value from its key_share extension.
    pub fn x25519_key_share(&self) -> Result<[u8; PUBLIC_KEY_SIZE]> {
        let body = self
            .extension(ExtensionType::KeyShare)
            .ok_or(Error::X25519Missing)?;
        parse_key_share(body)
    }
}
