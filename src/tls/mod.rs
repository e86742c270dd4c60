//! TLS wire structures used by the handshake disguise.
//!
//! Only the parts of TLS that appear on the wire before the tunnel takes
//! over are modelled: the record header, the ClientHello with its extension
//! block, and the fixed-shape ServerHello + ChangeCipherSpec reply.

pub mod codec;
pub mod record;

mod client_hello;
mod extensions;
mod key_share;
mod server_hello;

pub use client_hello::ClientHello;
pub use extensions::{parse_extensions, Extensions};
pub use key_share::parse_key_share;
pub use server_hello::{
    compose_reply, compose_server_hello, recover_session_key, ServerHelloField,
    SERVER_HELLO_LEN,
};

#[cfg(test)]
pub(crate) use client_hello::tests as fixtures;

/// Legacy record/handshake version carried by every record we emit (TLS 1.2)
pub const TLS12: [u8; 2] = [0x03, 0x03];

/// Version announced in the supported_versions extension (TLS 1.3)
pub const TLS13: [u8; 2] = [0x03, 0x04];

/// Size of a ClientHello/ServerHello random field
pub const RANDOM_SIZE: usize = 32;

/// TLS record types
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    /// Legacy middlebox-compatibility record
    ChangeCipherSpec = 0x14,
    /// Alert record
    Alert = 0x15,
    /// Handshake record
    Handshake = 0x16,
    /// Encrypted application data
    ApplicationData = 0x17,
}

/// TLS handshake types
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeType {
    /// ClientHello message
    ClientHello = 0x01,
    /// ServerHello message
    ServerHello = 0x02,
}

/// TLS extension types
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionType {
    /// server_name (SNI)
    ServerName = 0x0000,
    /// supported_groups
    SupportedGroups = 0x000a,
    /// signature_algorithms
    SignatureAlgorithms = 0x000d,
    /// ALPN
    ApplicationLayerProtocolNegotiation = 0x0010,
    /// supported_versions
    SupportedVersions = 0x002b,
    /// key_share
    KeyShare = 0x0033,
}

/// Named groups
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamedGroup {
    /// NIST P-256
    Secp256r1 = 0x0017,
    /// NIST P-384
    Secp384r1 = 0x0018,
    /// Curve25519 ECDH
    X25519 = 0x001d,
}

/// Cipher suite the disguise always selects
pub const TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384: u16 = 0xc030;
