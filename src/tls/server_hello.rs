//! Fixed-shape ServerHello composition.
//!
//! The reply is always the same 122-byte ServerHello followed by a
//! ChangeCipherSpec record. Only three fields vary: the random field, which
//! carries `session_key XOR shared_secret`, the echoed session id, and the
//! decorative server key share. A client holding the shared secret recovers
//! the session key with one XOR; anyone else sees a uniform nonce.

use bytes::{BufMut, BytesMut};

use crate::crypto::{random_bytes, SessionKey, SharedSecret, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};
use crate::tls::client_hello::ClientHello;
use crate::tls::codec::put_u24;
use crate::tls::record::{wrap_record, RECORD_HEADER_LEN};
use crate::tls::{
    ContentType, ExtensionType, HandshakeType, NamedGroup, RANDOM_SIZE, TLS12, TLS13,
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
};

/// Session id length the reply always declares
const SESSION_ID_LEN: usize = 32;

/// One component of the composed ServerHello, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerHelloField {
    /// Handshake type byte (ServerHello)
    HandshakeType,
    /// Three-byte handshake body length
    Length,
    /// Legacy version, always TLS 1.2
    ServerVersion,
    /// Masked session key
    Random,
    /// Session id length, always 32
    SessionIdLength,
    /// Echo of the client's session id
    SessionId,
    /// Selected cipher suite
    CipherSuite,
    /// Null compression
    CompressionMethod,
    /// Length of the extension block
    ExtensionsLength,
    /// key_share extension and x25519 entry header
    KeyShareHeader,
    /// Random x25519 public value
    KeyExchange,
    /// supported_versions extension selecting TLS 1.3
    SupportedVersions,
}

impl ServerHelloField {
    /// Every field, in the order it is written.
    pub const LAYOUT: [ServerHelloField; 12] = [
        Self::HandshakeType,
        Self::Length,
        Self::ServerVersion,
        Self::Random,
        Self::SessionIdLength,
        Self::SessionId,
        Self::CipherSuite,
        Self::CompressionMethod,
        Self::ExtensionsLength,
        Self::KeyShareHeader,
        Self::KeyExchange,
        Self::SupportedVersions,
    ];

    /// Encoded size in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::HandshakeType => 1,
            Self::Length => 3,
            Self::ServerVersion => 2,
            Self::Random => RANDOM_SIZE,
            Self::SessionIdLength => 1,
            Self::SessionId => SESSION_ID_LEN,
            Self::CipherSuite => 2,
            Self::CompressionMethod => 1,
            Self::ExtensionsLength => 2,
            // type(2) + len(2) + group(2) + key len(2)
            Self::KeyShareHeader => 8,
            Self::KeyExchange => PUBLIC_KEY_SIZE,
            // type(2) + len(2) + version(2)
            Self::SupportedVersions => 6,
        }
    }

    /// Whether the field's bytes depend on the handshake being answered.
    pub const fn is_variable(self) -> bool {
        matches!(self, Self::Random | Self::SessionId | Self::KeyExchange)
    }

    /// Offset of the field from the start of the ServerHello message.
    pub const fn offset(self) -> usize {
        let mut offset = 0;
        let mut i = 0;
        while i < Self::LAYOUT.len() {
            if Self::LAYOUT[i] as u8 == self as u8 {
                break;
            }
            offset += Self::LAYOUT[i].size();
            i += 1;
        }
        offset
    }

    const fn span(from: Self, to: Self) -> usize {
        to.offset() + to.size() - from.offset()
    }

    fn put(self, buf: &mut BytesMut, random: &[u8; RANDOM_SIZE], session_id: &[u8], key_exchange: &[u8; PUBLIC_KEY_SIZE]) {
        match self {
            Self::HandshakeType => buf.put_u8(HandshakeType::ServerHello as u8),
            Self::Length => put_u24(buf, (SERVER_HELLO_LEN - 4) as u32),
            Self::ServerVersion => buf.put_slice(&TLS12),
            Self::Random => buf.put_slice(random),
            Self::SessionIdLength => buf.put_u8(SESSION_ID_LEN as u8),
            Self::SessionId => {
                let n = session_id.len().min(SESSION_ID_LEN);
                buf.put_slice(&session_id[..n]);
                buf.put_bytes(0, SESSION_ID_LEN - n);
            }
            Self::CipherSuite => buf.put_u16(TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384),
            Self::CompressionMethod => buf.put_u8(0),
            Self::ExtensionsLength => {
                buf.put_u16(Self::span(Self::KeyShareHeader, Self::SupportedVersions) as u16)
            }
            Self::KeyShareHeader => {
                buf.put_u16(ExtensionType::KeyShare as u16);
                buf.put_u16(Self::span(Self::KeyShareHeader, Self::KeyExchange) as u16 - 4);
                buf.put_u16(NamedGroup::X25519 as u16);
                buf.put_u16(PUBLIC_KEY_SIZE as u16);
            }
            Self::KeyExchange => buf.put_slice(key_exchange),
            Self::SupportedVersions => {
                buf.put_u16(ExtensionType::SupportedVersions as u16);
                buf.put_u16(2);
                buf.put_slice(&TLS13);
            }
        }
    }
}

/// Total size of the composed ServerHello handshake message
pub const SERVER_HELLO_LEN: usize =
    ServerHelloField::span(ServerHelloField::HandshakeType, ServerHelloField::SupportedVersions);

/// Compose the ServerHello handshake message.
///
/// The random field is `session_key XOR shared_secret`. The session id is
/// echoed into a fixed 32-byte field: a shorter id is zero-padded, a longer
/// one truncated. The key_share value is fresh randomness on every call.
pub fn compose_server_hello(
    session_id: &[u8],
    shared_secret: &SharedSecret,
    session_key: &SessionKey,
) -> Vec<u8> {
    let random = shared_secret.mask(session_key);
    let key_exchange: [u8; PUBLIC_KEY_SIZE] = random_bytes();

    let mut buf = BytesMut::with_capacity(SERVER_HELLO_LEN);
    for field in ServerHelloField::LAYOUT {
        field.put(&mut buf, &random, session_id, &key_exchange);
    }
    debug_assert_eq!(buf.len(), SERVER_HELLO_LEN);
    buf.to_vec()
}

/// Compose the complete reply: ServerHello record then ChangeCipherSpec.
///
/// Built fresh on every call; nothing is cached between session keys.
pub fn compose_reply(
    client_hello: &ClientHello,
    shared_secret: &SharedSecret,
    session_key: &SessionKey,
) -> Vec<u8> {
    let server_hello = compose_server_hello(client_hello.session_id(), shared_secret, session_key);
    let mut reply = wrap_record(&server_hello, ContentType::Handshake, TLS12);
    reply.extend(wrap_record(&[0x01], ContentType::ChangeCipherSpec, TLS12));
    reply
}

/// Client side: pull the session key out of a composed reply.
pub fn recover_session_key(reply: &[u8], shared_secret: &SharedSecret) -> Result<SessionKey> {
    if reply.len() < RECORD_HEADER_LEN + SERVER_HELLO_LEN {
        return Err(Error::InvalidMessage("ServerHello too short".into()));
    }
    if reply[0] != ContentType::Handshake as u8 {
        return Err(Error::InvalidMessage("Not a handshake record".into()));
    }

    let server_hello = &reply[RECORD_HEADER_LEN..];
    if server_hello[0] != HandshakeType::ServerHello as u8 {
        return Err(Error::InvalidMessage("Not a ServerHello".into()));
    }

    let start = ServerHelloField::Random.offset();
    let mut random = [0u8; RANDOM_SIZE];
    random.copy_from_slice(&server_hello[start..start + RANDOM_SIZE]);
    Ok(shared_secret.unmask(&random))
}
