//! Reference authenticator.
//!
//! The client's key_share value meets the server's static x25519 key. From
//! the agreement the server recomputes the auth tag over the random nonce,
//! unmasks the client UID, opens the sealed metadata and derives the shared
//! secret that will mask the session key.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::cloak::{
    Authenticator, Credentials, ServerState, SessionMetadata, NONCE_SIZE, SEALED_METADATA_SIZE,
    UID_SIZE,
};
use crate::crypto::kdf::{compute_auth_tag, derive_shared_secret, xor_bytes};
use crate::crypto::{PublicKey, StaticSecret};
use crate::error::{Error, Result};
use crate::tls::ClientHello;

/// Authenticates clients holding the server public key and an allowed UID.
pub struct TouchStone {
    static_secret: StaticSecret,
    allowed_uids: RwLock<HashSet<[u8; UID_SIZE]>>,
}

impl TouchStone {
    /// Create an authenticator around the server's static key.
    pub fn new(static_secret: StaticSecret, allowed_uids: impl IntoIterator<Item = [u8; UID_SIZE]>) -> Self {
        Self {
            static_secret,
            allowed_uids: RwLock::new(allowed_uids.into_iter().collect()),
        }
    }

    /// The public key clients must be configured with.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.static_secret)
    }

    /// Allow a UID.
    pub fn add_uid(&self, uid: [u8; UID_SIZE]) {
        self.allowed_uids.write().insert(uid);
    }

    /// Revoke a UID. Returns whether it was allowed.
    pub fn remove_uid(&self, uid: &[u8; UID_SIZE]) -> bool {
        self.allowed_uids.write().remove(uid)
    }

    /// Check if a UID is allowed.
    pub fn is_uid_allowed(&self, uid: &[u8; UID_SIZE]) -> bool {
        self.allowed_uids.read().contains(uid)
    }
}

impl Authenticator for TouchStone {
    fn authenticate(&self, client_hello: &ClientHello, _state: &ServerState) -> Result<Credentials> {
        let client_public = PublicKey::from_bytes(client_hello.x25519_key_share()?);
        let dh = self.static_secret.diffie_hellman(&client_public);
        if !dh.was_contributory() {
            return Err(Error::authentication("non-contributory key share"));
        }

        let random = client_hello.random();
        let nonce = &random[..NONCE_SIZE];

        let mut masked_uid = [0u8; UID_SIZE];
        masked_uid.copy_from_slice(&random[NONCE_SIZE..]);
        let uid = xor_bytes(&masked_uid, &compute_auth_tag(dh.as_bytes(), &[nonce]));
        if !self.is_uid_allowed(&uid) {
            return Err(Error::authentication("unknown UID"));
        }

        let sealed: [u8; SEALED_METADATA_SIZE] = client_hello
            .session_id()
            .try_into()
            .map_err(|_| Error::authentication("session id is not 32 bytes"))?;
        let metadata = SessionMetadata::open(&sealed, dh.as_bytes(), nonce)?;

        Ok(Credentials {
            client_id: uid.to_vec(),
            session_id: metadata.session_id,
            proxy_method: metadata.proxy_method,
            encryption_method: metadata.encryption_method,
            shared_secret: derive_shared_secret(dh.as_bytes())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cloak::{ClientHelloBuilder, ProxyBook};

    const UID: [u8; UID_SIZE] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    fn setup() -> (Arc<TouchStone>, ServerState) {
        let touchstone = Arc::new(TouchStone::new(StaticSecret::random(), [UID]));
        let state = ServerState::new(ProxyBook::new(), touchstone.clone());
        (touchstone, state)
    }

    fn builder(server_public: PublicKey, uid: [u8; UID_SIZE]) -> ClientHelloBuilder {
        let meta = SessionMetadata::new(42, 3, "shadowsocks").unwrap();
        ClientHelloBuilder::new("www.example.com", server_public, uid, meta)
    }

    #[test]
    fn test_authenticates_built_hello() {
        let (touchstone, state) = setup();
        let built = builder(touchstone.public_key(), UID).build().unwrap();
        let ch = ClientHello::parse(&built.record).unwrap();

        let creds = touchstone.authenticate(&ch, &state).unwrap();
        assert_eq!(creds.client_id, UID.to_vec());
        assert_eq!(creds.session_id, 42);
        assert_eq!(creds.encryption_method, 3);
        assert_eq!(creds.proxy_method, "shadowsocks");
        assert_eq!(creds.shared_secret, built.shared_secret);
    }

    #[test]
    fn test_unknown_uid_rejected() {
        let (touchstone, state) = setup();
        let built = builder(touchstone.public_key(), [0xee; UID_SIZE]).build().unwrap();
        let ch = ClientHello::parse(&built.record).unwrap();

        assert!(matches!(
            touchstone.authenticate(&ch, &state),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_wrong_server_key_rejected() {
        let (touchstone, state) = setup();
        let other = PublicKey::from(&StaticSecret::random());
        let built = builder(other, UID).build().unwrap();
        let ch = ClientHello::parse(&built.record).unwrap();

        assert!(touchstone.authenticate(&ch, &state).is_err());
    }

    #[test]
    fn test_revoked_uid_rejected() {
        let (touchstone, state) = setup();
        let built = builder(touchstone.public_key(), UID).build().unwrap();
        let ch = ClientHello::parse(&built.record).unwrap();

        assert!(touchstone.remove_uid(&UID));
        assert!(touchstone.authenticate(&ch, &state).is_err());

        touchstone.add_uid(UID);
        assert!(touchstone.authenticate(&ch, &state).is_ok());
    }
}
