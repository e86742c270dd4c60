//! Connection preparation: authenticate now, reply later.
//!
//! The session key only exists once the data plane has negotiated the proxy
//! method, so the reply is deferred. [`prepare_connection`] does every check
//! up front and hands back a [`PendingReply`] holding the parsed ClientHello
//! and the shared secret. Sending consumes it, so a reply goes out at most
//! once.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::cloak::ServerState;
use crate::crypto::{SessionKey, SharedSecret};
use crate::error::{Error, Result};
use crate::tls::{compose_reply, ClientHello};

/// A handshake that passed every check and awaits its reply.
#[derive(Debug)]
pub struct PreparedConnection {
    /// Authenticated client identity
    pub client_id: Vec<u8>,
    /// Session the client asked for
    pub session_id: u32,
    /// Requested proxy method, known to the ProxyBook
    pub proxy_method: String,
    /// Data plane encryption selector
    pub encryption_method: u8,
    /// The deferred ServerHello
    pub reply: PendingReply,
}

/// Deferred ServerHello + ChangeCipherSpec for one connection.
#[derive(Debug)]
pub struct PendingReply {
    client_hello: ClientHello,
    shared_secret: SharedSecret,
}

impl PendingReply {
    /// Compose the reply for `session_key` and write it to `conn`.
    ///
    /// Returns the connection for the data plane on success. If the write
    /// fails the error comes back immediately while the connection is shut
    /// down in a background task; a failing shutdown is ignored.
    pub async fn send<C>(self, session_key: &SessionKey, mut conn: C) -> Result<C>
    where
        C: AsyncWrite + Unpin + Send + 'static,
    {
        let reply = compose_reply(&self.client_hello, &self.shared_secret, session_key);
        drop(self);

        let written = match conn.write_all(&reply).await {
            Ok(()) => conn.flush().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => Ok(conn),
            Err(e) => {
                tokio::spawn(async move {
                    let _ = conn.shutdown().await;
                });
                Err(Error::Network(e))
            }
        }
    }
}

/// Parse, authenticate and policy-check the first packet of a connection.
///
/// Failures are reported coarsely: [`Error::BadClientHello`] for anything
/// that is not a well-formed ClientHello, [`Error::NotCloak`] for any
/// authentication failure and [`Error::BadProxyMethod`] for an unknown proxy
/// method. The detailed reason is only logged at debug level. On any of
/// these the caller should drop the connection without replying.
pub fn prepare_connection(first_packet: &[u8], state: &ServerState) -> Result<PreparedConnection> {
    let client_hello = ClientHello::parse(first_packet).map_err(|e| {
        tracing::debug!("Rejecting first packet: {}", e);
        Error::BadClientHello
    })?;

    let credentials = state
        .authenticator
        .authenticate(&client_hello, state)
        .map_err(|e| {
            tracing::debug!("ClientHello failed authentication: {}", e);
            Error::NotCloak
        })?;

    if !state.proxy_book.contains(&credentials.proxy_method) {
        tracing::debug!("Unsupported proxy method {:?}", credentials.proxy_method);
        return Err(Error::BadProxyMethod);
    }

    Ok(PreparedConnection {
        client_id: credentials.client_id,
        session_id: credentials.session_id,
        proxy_method: credentials.proxy_method,
        encryption_method: credentials.encryption_method,
        reply: PendingReply {
            client_hello,
            shared_secret: credentials.shared_secret,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use super::*;
    use crate::cloak::{Authenticator, ClientHelloBuilder, Credentials, ProxyBook, SessionMetadata, TouchStone};
    use crate::crypto::kdf::xor_bytes;
    use crate::crypto::StaticSecret;
    use crate::tls::fixtures::{client_hello_record, x25519_key_share_ext};
    use crate::tls::recover_session_key;

    const SECRET: [u8; 32] = [0x5c; 32];
    const SESSION_ID: [u8; 32] = [0x3a; 32];

    /// Authenticator returning a canned answer and counting calls.
    struct StubAuth {
        succeed: bool,
        method: &'static str,
        calls: AtomicUsize,
    }

    impl Authenticator for StubAuth {
        fn authenticate(&self, _client_hello: &ClientHello, _state: &ServerState) -> Result<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.succeed {
                return Err(Error::authentication("bad credentials"));
            }
            Ok(Credentials {
                client_id: vec![0x01; 8],
                session_id: 77,
                proxy_method: self.method.to_string(),
                encryption_method: 2,
                shared_secret: SharedSecret::from_bytes(SECRET),
            })
        }
    }

    fn state(succeed: bool, method: &'static str) -> (Arc<StubAuth>, ServerState) {
        let auth = Arc::new(StubAuth {
            succeed,
            method,
            calls: AtomicUsize::new(0),
        });
        let book: ProxyBook = [("shadowsocks", "127.0.0.1:8388")].into_iter().collect();
        (auth.clone(), ServerState::new(book, auth))
    }

    fn first_packet() -> Vec<u8> {
        client_hello_record([0x44; 32], &SESSION_ID, &[x25519_key_share_ext(&[0x66; 32])])
    }

    #[tokio::test]
    async fn test_valid_hello_gets_spoofed_reply() {
        let (_, state) = state(true, "shadowsocks");
        let prepared = prepare_connection(&first_packet(), &state).unwrap();

        assert_eq!(prepared.client_id, vec![0x01; 8]);
        assert_eq!(prepared.session_id, 77);
        assert_eq!(prepared.proxy_method, "shadowsocks");
        assert_eq!(prepared.encryption_method, 2);

        let key = SessionKey::from_bytes([0xa7; 32]);
        let wire = prepared.reply.send(&key, Vec::new()).await.unwrap();

        assert_eq!(wire.len(), 133);
        assert_eq!(&wire[..5], &[0x16, 0x03, 0x03, 0x00, 0x7a]);
        assert_eq!(&wire[5..9], &[0x02, 0x00, 0x00, 0x76]);
        assert_eq!(&wire[11..43], &xor_bytes(&SECRET, &[0xa7; 32]));
        assert_eq!(wire[43], 0x20);
        assert_eq!(&wire[44..76], &SESSION_ID);
        assert_eq!(&wire[127..], &[0x14, 0x03, 0x03, 0x00, 0x01, 0x01]);

        let recovered = recover_session_key(&wire, &SharedSecret::from_bytes(SECRET)).unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn test_not_a_client_hello_stops_early() {
        let (auth, state) = state(true, "shadowsocks");
        let mut packet = first_packet();
        packet[5] = 0x02;

        assert!(matches!(
            prepare_connection(&packet, &state),
            Err(Error::BadClientHello)
        ));
        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_truncated_hello_is_bad_client_hello() {
        let (auth, state) = state(true, "shadowsocks");
        let packet = first_packet();

        for len in [0, 4, 5, 9, 60, packet.len() - 1] {
            assert!(matches!(
                prepare_connection(&packet[..len], &state),
                Err(Error::BadClientHello)
            ));
        }
        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_authentication_failure_is_not_cloak() {
        let (auth, state) = state(false, "shadowsocks");
        let err = prepare_connection(&first_packet(), &state).unwrap_err();

        assert!(matches!(err, Error::NotCloak));
        assert_eq!(err.to_string(), "TLS but non-Cloak ClientHello");
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_proxy_method() {
        let (_, state) = state(true, "openvpn");
        assert!(matches!(
            prepare_connection(&first_packet(), &state),
            Err(Error::BadProxyMethod)
        ));

        state.proxy_book.insert("openvpn", "127.0.0.1:1194");
        assert!(prepare_connection(&first_packet(), &state).is_ok());
    }

    #[tokio::test]
    async fn test_each_send_composes_fresh_reply() {
        let (_, state) = state(true, "shadowsocks");
        let first = prepare_connection(&first_packet(), &state).unwrap();
        let second = prepare_connection(&first_packet(), &state).unwrap();

        let a = first.reply.send(&SessionKey::from_bytes([1; 32]), Vec::new()).await.unwrap();
        let b = second.reply.send(&SessionKey::from_bytes([2; 32]), Vec::new()).await.unwrap();
        assert_ne!(&a[11..43], &b[11..43]);
    }

    #[derive(Debug)]
    struct FailingWriter {
        closed: Arc<AtomicBool>,
    }

    impl AsyncWrite for FailingWriter {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.closed.store(true, Ordering::SeqCst);
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "close failed too")))
        }
    }

    #[tokio::test]
    async fn test_write_failure_reports_and_closes_in_background() {
        let (_, state) = state(true, "shadowsocks");
        let prepared = prepare_connection(&first_packet(), &state).unwrap();

        let closed = Arc::new(AtomicBool::new(false));
        let conn = FailingWriter {
            closed: closed.clone(),
        };
        let err = prepared
            .reply
            .send(&SessionKey::random(), conn)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(ref e) if e.kind() == io::ErrorKind::BrokenPipe));

        for _ in 0..100 {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_touchstone_end_to_end() {
        let touchstone = Arc::new(TouchStone::new(StaticSecret::random(), [[0x09; 8]]));
        let book: ProxyBook = [("shadowsocks", "127.0.0.1:8388")].into_iter().collect();
        let state = ServerState::new(book, touchstone.clone());

        let meta = SessionMetadata::new(1234, 1, "shadowsocks").unwrap();
        let built = ClientHelloBuilder::new("www.example.com", touchstone.public_key(), [0x09; 8], meta)
            .build()
            .unwrap();

        let prepared = prepare_connection(&built.record, &state).unwrap();
        assert_eq!(prepared.session_id, 1234);
        assert_eq!(prepared.client_id, vec![0x09; 8]);

        let key = SessionKey::random();
        let wire = prepared.reply.send(&key, Vec::new()).await.unwrap();
        assert_eq!(recover_session_key(&wire, &built.shared_secret).unwrap(), key);

        // Echoed session id is the client's sealed metadata
        let ch = ClientHello::parse(&built.record).unwrap();
        assert_eq!(&wire[44..76], ch.session_id());
    }
}
