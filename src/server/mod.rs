//! Handshake listener.
//!
//! Accepts TCP connections, reads the first record, and runs it through
//! [`prepare_connection`]. Connections that fail get no reply; the socket is
//! simply dropped. Accepted ones get the disguised ServerHello with a fresh
//! session key and are handed to the data plane over an mpsc channel.
//!
//! ```text
//!   accept ──► first record ──► prepare ──► reply ──► EstablishedSession ──► data plane
//!                  │               │          │
//!                  ▼               ▼          ▼
//!               timeout         rejected   write failed
//!                  └───────────────┴──────────┴──► drop
//! ```

pub mod config;
mod metrics;

pub use config::{ServerConfig, ServerConfigFile};
pub use metrics::{MetricsSnapshot, ServerMetrics};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::cloak::{prepare_connection, ServerState, TouchStone};
use crate::crypto::SessionKey;
use crate::error::{Error, Result};
use crate::tls::record::RECORD_HEADER_LEN;
use crate::tls::ContentType;

/// Established sessions buffered for a slow data plane
const SESSION_QUEUE_DEPTH: usize = 256;

/// A connection that completed the handshake.
#[derive(Debug)]
pub struct EstablishedSession {
    /// Remote address
    pub peer_addr: SocketAddr,
    /// Authenticated client identity
    pub client_id: Vec<u8>,
    /// Session the client asked for
    pub session_id: u32,
    /// Proxy method to hand the stream to
    pub proxy_method: String,
    /// Data plane encryption selector
    pub encryption_method: u8,
    /// Key delivered in the ServerHello random
    pub session_key: SessionKey,
    /// The connection, positioned after the reply
    pub stream: TcpStream,
}

/// Main server instance.
pub struct Server {
    config: Arc<ServerConfig>,
    touchstone: Arc<TouchStone>,
    state: Arc<ServerState>,
    metrics: Arc<ServerMetrics>,
    sessions: mpsc::Sender<EstablishedSession>,
}

impl Server {
    /// Create a server and the receiver its sessions are delivered to.
    pub fn new(config: ServerConfig) -> (Self, mpsc::Receiver<EstablishedSession>) {
        let touchstone = Arc::new(TouchStone::new(
            config.static_secret.clone(),
            config.allowed_uids.iter().copied(),
        ));
        let state = Arc::new(ServerState::new(config.proxy_book(), touchstone.clone()));
        let (sessions, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);

        let server = Self {
            config: Arc::new(config),
            touchstone,
            state,
            metrics: Arc::new(ServerMetrics::new()),
            sessions,
        };
        (server, rx)
    }

    /// Bind the configured address and serve.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.listen_addr, self.config.listen_port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!("Cloak server listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let config = Arc::clone(&self.config);
                    let state = Arc::clone(&self.state);
                    let metrics = Arc::clone(&self.metrics);
                    let sessions = self.sessions.clone();

                    tokio::spawn(async move {
                        metrics.increment_connections();

                        if let Err(e) =
                            Self::handle_connection(config, state, &metrics, sessions, stream, peer_addr)
                                .await
                        {
                            metrics.record_rejection(&e);
                            tracing::debug!("Connection from {} dropped: {}", peer_addr, e);
                        }

                        metrics.decrement_connections();
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        config: Arc<ServerConfig>,
        state: Arc<ServerState>,
        metrics: &ServerMetrics,
        sessions: mpsc::Sender<EstablishedSession>,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream.set_nodelay(true)?;

        let first_packet = match timeout(
            config.first_packet_timeout,
            read_first_packet(&mut stream, config.max_first_packet),
        )
        .await
        {
            Ok(read) => read?,
            Err(_) => {
                metrics.increment_first_packet_timeouts();
                return Err(Error::Timeout(config.first_packet_timeout.as_millis() as u64));
            }
        };

        let prepared = prepare_connection(&first_packet, &state)?;

        let session_key = SessionKey::random();
        let stream = prepared
            .reply
            .send(&session_key, stream)
            .await
            .map_err(|e| {
                metrics.increment_reply_failures();
                e
            })?;
        metrics.increment_established();
        tracing::debug!(
            "Session {} established from {} for {}",
            prepared.session_id,
            peer_addr,
            prepared.proxy_method
        );

        sessions
            .send(EstablishedSession {
                peer_addr,
                client_id: prepared.client_id,
                session_id: prepared.session_id,
                proxy_method: prepared.proxy_method,
                encryption_method: prepared.encryption_method,
                session_key,
                stream,
            })
            .await
            .map_err(|_| Error::InvalidMessage("session receiver closed".into()))
    }

    /// Get server metrics.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Proxy methods and authenticator, changeable while serving.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// The client allow-list, changeable while serving.
    pub fn touchstone(&self) -> &TouchStone {
        &self.touchstone
    }
}

/// Read exactly one TLS record.
///
/// Anything that does not start like a handshake record, or announces more
/// than `max_len` bytes, is rejected before the body is read.
async fn read_first_packet<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; RECORD_HEADER_LEN];
    reader.read_exact(&mut header).await?;

    if header[0] != ContentType::Handshake as u8 || header[1] != 0x03 {
        return Err(Error::BadClientHello);
    }
    let body_len = u16::from_be_bytes([header[3], header[4]]) as usize;
    if RECORD_HEADER_LEN + body_len > max_len {
        return Err(Error::BadClientHello);
    }

    let mut packet = vec![0u8; RECORD_HEADER_LEN + body_len];
    packet[..RECORD_HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut packet[RECORD_HEADER_LEN..]).await?;
    Ok(packet)
}
