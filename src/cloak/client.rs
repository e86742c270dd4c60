//! Client side of the disguised handshake.
//!
//! Builds a ClientHello shaped like a mainstream browser's, with the UID and
//! sealed metadata hidden in its random and session id fields, then pulls the
//! session key out of the server's reply.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::cloak::config::ClientConfig;
use crate::cloak::{SessionMetadata, NONCE_SIZE, UID_SIZE};
use crate::crypto::kdf::{compute_auth_tag, derive_shared_secret, xor_bytes};
use crate::crypto::{random_bytes, EphemeralSecret, PublicKey, SessionKey, SharedSecret};
use crate::error::{Error, Result};
use crate::tls::codec::put_u24;
use crate::tls::record::{wrap_record, RECORD_HEADER_LEN};
use crate::tls::{
    recover_session_key, ContentType, ExtensionType, HandshakeType, NamedGroup, RANDOM_SIZE,
    SERVER_HELLO_LEN, TLS12, TLS13,
};

/// Full reply length: ServerHello record plus ChangeCipherSpec record
const REPLY_LEN: usize = RECORD_HEADER_LEN + SERVER_HELLO_LEN + RECORD_HEADER_LEN + 1;

/// Builder for ClientHello messages carrying Cloak credentials.
pub struct ClientHelloBuilder {
    /// Server name indication (SNI)
    sni: String,
    /// Server's static public key
    server_public: PublicKey,
    /// UID to embed in the random field
    uid: [u8; UID_SIZE],
    /// Metadata to seal in the session id
    metadata: SessionMetadata,
    /// ALPN protocols to advertise
    alpn: Vec<String>,
}

/// A built ClientHello record and the secret the reply will be masked with.
pub struct BuiltClientHello {
    /// Complete record, header included
    pub record: Vec<u8>,
    /// Secret for recovering the session key from the reply
    pub shared_secret: SharedSecret,
}

impl ClientHelloBuilder {
    /// Create a new ClientHello builder.
    pub fn new(
        sni: impl Into<String>,
        server_public: PublicKey,
        uid: [u8; UID_SIZE],
        metadata: SessionMetadata,
    ) -> Self {
        Self {
            sni: sni.into(),
            server_public,
            uid,
            metadata,
            alpn: vec!["h2".to_string(), "http/1.1".to_string()],
        }
    }

    /// Replace the advertised ALPN protocols.
    pub fn alpn(mut self, alpn: Vec<String>) -> Self {
        self.alpn = alpn;
        self
    }

    /// Build the ClientHello with a fresh ephemeral key and nonce.
    ///
    /// The random field is laid out as:
    /// - Bytes 0-23: nonce
    /// - Bytes 24-31: uid XOR auth_tag
    pub fn build(&self) -> Result<BuiltClientHello> {
        let ephemeral = EphemeralSecret::random();
        let client_public = PublicKey::from(&ephemeral);
        let dh = ephemeral.diffie_hellman(&self.server_public);

        let nonce: [u8; NONCE_SIZE] = random_bytes();
        let auth_tag = compute_auth_tag(dh.as_bytes(), &[&nonce]);
        let mut random = [0u8; RANDOM_SIZE];
        random[..NONCE_SIZE].copy_from_slice(&nonce);
        random[NONCE_SIZE..].copy_from_slice(&xor_bytes(&self.uid, &auth_tag));

        let session_id = self.metadata.seal(dh.as_bytes(), &nonce)?;
        let handshake = self.build_client_hello_body(&random, &session_id, &client_public);

        Ok(BuiltClientHello {
            record: wrap_record(&handshake, ContentType::Handshake, TLS12),
            shared_secret: derive_shared_secret(dh.as_bytes())?,
        })
    }

    fn build_client_hello_body(&self, random: &[u8; RANDOM_SIZE], session_id: &[u8], client_public: &PublicKey) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(512);

        buf.put_u8(HandshakeType::ClientHello as u8);
        let length_pos = buf.len();
        put_u24(&mut buf, 0);

        buf.put_slice(&TLS12);
        buf.put_slice(random);

        buf.put_u8(session_id.len() as u8);
        buf.put_slice(session_id);

        let cipher_suites = Self::cipher_suites();
        buf.put_u16(cipher_suites.len() as u16);
        buf.put_slice(&cipher_suites);

        // Compression methods: null only
        buf.put_u8(1);
        buf.put_u8(0);

        let extensions = self.build_extensions(client_public);
        buf.put_u16(extensions.len() as u16);
        buf.put_slice(&extensions);

        let total_len = (buf.len() - 4) as u32;
        buf[length_pos..length_pos + 3].copy_from_slice(&total_len.to_be_bytes()[1..]);

        buf.to_vec()
    }

    fn cipher_suites() -> Vec<u8> {
        vec![
            0x13, 0x01, // TLS_AES_128_GCM_SHA256
            0x13, 0x02, // TLS_AES_256_GCM_SHA384
            0x13, 0x03, // TLS_CHACHA20_POLY1305_SHA256
            0xc0, 0x2b, // TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
            0xc0, 0x2f, // TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
            0xc0, 0x2c, // TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
            0xc0, 0x30, // TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384
            0xcc, 0xa9, // TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
            0xcc, 0xa8, // TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256
        ]
    }

    fn build_extensions(&self, client_public: &PublicKey) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(256);

        self.write_sni_extension(&mut buf);
        Self::write_supported_groups(&mut buf);
        Self::write_signature_algorithms(&mut buf);
        if !self.alpn.is_empty() {
            self.write_alpn_extension(&mut buf);
        }
        Self::write_supported_versions(&mut buf);
        Self::write_key_share(&mut buf, client_public);

        buf.to_vec()
    }

    fn write_sni_extension(&self, buf: &mut BytesMut) {
        let sni_bytes = self.sni.as_bytes();
        let list_len = 3 + sni_bytes.len(); // type(1) + len(2) + name

        buf.put_u16(ExtensionType::ServerName as u16);
        buf.put_u16((2 + list_len) as u16);
        buf.put_u16(list_len as u16);
        buf.put_u8(0); // host_name
        buf.put_u16(sni_bytes.len() as u16);
        buf.put_slice(sni_bytes);
    }

    fn write_supported_groups(buf: &mut BytesMut) {
        let groups = [NamedGroup::X25519, NamedGroup::Secp256r1, NamedGroup::Secp384r1];

        buf.put_u16(ExtensionType::SupportedGroups as u16);
        buf.put_u16((2 + 2 * groups.len()) as u16);
        buf.put_u16((2 * groups.len()) as u16);
        for group in groups {
            buf.put_u16(group as u16);
        }
    }

    fn write_signature_algorithms(buf: &mut BytesMut) {
        let algorithms = [
            0x04, 0x03, // ecdsa_secp256r1_sha256
            0x08, 0x04, // rsa_pss_rsae_sha256
            0x04, 0x01, // rsa_pkcs1_sha256
            0x05, 0x03, // ecdsa_secp384r1_sha384
            0x08, 0x05, // rsa_pss_rsae_sha384
            0x05, 0x01, // rsa_pkcs1_sha384
            0x08, 0x06, // rsa_pss_rsae_sha512
            0x06, 0x01, // rsa_pkcs1_sha512
        ];

        buf.put_u16(ExtensionType::SignatureAlgorithms as u16);
        buf.put_u16((2 + algorithms.len()) as u16);
        buf.put_u16(algorithms.len() as u16);
        buf.put_slice(&algorithms);
    }

    fn write_alpn_extension(&self, buf: &mut BytesMut) {
        let mut alpn_list = Vec::new();
        for proto in &self.alpn {
            alpn_list.push(proto.len() as u8);
            alpn_list.extend_from_slice(proto.as_bytes());
        }

        buf.put_u16(ExtensionType::ApplicationLayerProtocolNegotiation as u16);
        buf.put_u16((2 + alpn_list.len()) as u16);
        buf.put_u16(alpn_list.len() as u16);
        buf.put_slice(&alpn_list);
    }

    fn write_supported_versions(buf: &mut BytesMut) {
        buf.put_u16(ExtensionType::SupportedVersions as u16);
        buf.put_u16(5);
        buf.put_u8(4);
        buf.put_slice(&TLS13);
        buf.put_slice(&TLS12);
    }

    fn write_key_share(buf: &mut BytesMut, client_public: &PublicKey) {
        let key_bytes = client_public.as_bytes();
        let entry_len = 2 + 2 + key_bytes.len(); // group(2) + len(2) + key

        buf.put_u16(ExtensionType::KeyShare as u16);
        buf.put_u16((2 + entry_len) as u16);
        buf.put_u16(entry_len as u16);
        buf.put_u16(NamedGroup::X25519 as u16);
        buf.put_u16(key_bytes.len() as u16);
        buf.put_slice(key_bytes);
    }
}

/// Cloak client.
pub struct CloakClient {
    config: ClientConfig,
}

/// A completed client handshake.
pub struct ClientSession {
    /// Connection to the server, positioned after the handshake reply
    pub stream: TcpStream,
    /// Session key recovered from the ServerHello
    pub session_key: SessionKey,
}

impl CloakClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(Error::config)?;
        Ok(Self { config })
    }

    /// Connect and run the disguised handshake.
    pub async fn connect(&self) -> Result<ClientSession> {
        self.connect_with_timeout(Duration::from_secs(10)).await
    }

    /// Connect with a custom timeout.
    pub async fn connect_with_timeout(&self, connect_timeout: Duration) -> Result<ClientSession> {
        let addr: SocketAddr = format!("{}:{}", self.config.server_addr, self.config.server_port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid server address: {}", e)))?;

        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(connect_timeout.as_millis() as u64))?
            .map_err(Error::Network)?;
        stream.set_nodelay(true)?;

        self.handshake(stream, connect_timeout).await
    }

    /// Run the handshake over an already connected stream.
    pub async fn handshake(&self, mut stream: TcpStream, reply_timeout: Duration) -> Result<ClientSession> {
        let metadata = SessionMetadata::new(
            self.config.session_id,
            self.config.encryption_method,
            self.config.proxy_method.clone(),
        )?;
        let built = ClientHelloBuilder::new(
            &self.config.cover_sni,
            self.config.server_public_key(),
            self.config.uid,
            metadata,
        )
        .alpn(self.config.alpn.clone())
        .build()?;

        stream.write_all(&built.record).await?;

        // A rejected hello gets no answer; the server just closes
        let mut reply = [0u8; REPLY_LEN];
        timeout(reply_timeout, stream.read_exact(&mut reply))
            .await
            .map_err(|_| Error::Timeout(reply_timeout.as_millis() as u64))?
            .map_err(Error::Network)?;

        let session_key = recover_session_key(&reply, &built.shared_secret)?;
        Ok(ClientSession {
            stream,
            session_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::StaticSecret;
    use crate::tls::ClientHello;

    fn built() -> BuiltClientHello {
        let server_public = PublicKey::from(&StaticSecret::random());
        let meta = SessionMetadata::new(9, 1, "shadowsocks").unwrap();
        ClientHelloBuilder::new("www.example.com", server_public, [0x11; UID_SIZE], meta)
            .build()
            .unwrap()
    }

    #[test]
    fn test_built_hello_parses() {
        let built = built();
        assert_eq!(built.record[0], ContentType::Handshake as u8);
        assert_eq!(&built.record[1..3], &TLS12);
        assert_eq!(built.record[5], HandshakeType::ClientHello as u8);

        let ch = ClientHello::parse(&built.record).unwrap();
        assert_eq!(ch.session_id().len(), 32);
        assert_eq!(ch.compression_methods(), &[0x00]);
        assert!(ch.extension(ExtensionType::ServerName).is_some());
        assert!(ch.extension(ExtensionType::ApplicationLayerProtocolNegotiation).is_some());
        assert!(ch.x25519_key_share().is_ok());
    }

    #[test]
    fn test_record_length_matches_payload() {
        let built = built();
        let record_len = u16::from_be_bytes([built.record[3], built.record[4]]) as usize;
        assert_eq!(record_len, built.record.len() - RECORD_HEADER_LEN);
    }

    #[test]
    fn test_every_hello_is_fresh() {
        let a = built();
        let b = built();
        assert_ne!(a.record, b.record);
        assert_ne!(a.shared_secret, b.shared_secret);
    }

    #[test]
    fn test_reply_len() {
        assert_eq!(REPLY_LEN, 133);
    }
}
