//! Server configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cloak::{ProxyBook, UID_SIZE};
use crate::crypto::{random_bytes, PublicKey, StaticSecret};
use crate::error::{Error, Result};

/// Largest first packet the listener reads before giving up on a ClientHello
pub const DEFAULT_MAX_FIRST_PACKET: usize = 16 * 1024;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub listen_port: u16,
    /// Server's static x25519 key
    pub static_secret: StaticSecret,
    /// Client UIDs allowed to authenticate
    pub allowed_uids: Vec<[u8; UID_SIZE]>,
    /// Proxy method name to backend address
    pub proxy_methods: BTreeMap<String, String>,
    /// How long a client may take to send its ClientHello
    pub first_packet_timeout: Duration,
    /// Largest ClientHello record accepted
    pub max_first_packet: usize,
}

impl ServerConfig {
    /// Create a new configuration with a random keypair.
    pub fn new_random(listen_addr: impl Into<String>, listen_port: u16) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            listen_port,
            static_secret: StaticSecret::random(),
            allowed_uids: Vec::new(),
            proxy_methods: BTreeMap::new(),
            first_packet_timeout: Duration::from_secs(10),
            max_first_packet: DEFAULT_MAX_FIRST_PACKET,
        }
    }

    /// Get the server's public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.static_secret)
    }

    /// Add an allowed client UID.
    pub fn add_client_uid(&mut self, uid: [u8; UID_SIZE]) {
        if !self.allowed_uids.contains(&uid) {
            self.allowed_uids.push(uid);
        }
    }

    /// Generate a random client UID and add it.
    pub fn generate_client_uid(&mut self) -> [u8; UID_SIZE] {
        let uid: [u8; UID_SIZE] = random_bytes();
        self.add_client_uid(uid);
        uid
    }

    /// Serve `method` by relaying to `backend`.
    pub fn add_proxy_method(&mut self, method: impl Into<String>, backend: impl Into<String>) {
        self.proxy_methods.insert(method.into(), backend.into());
    }

    /// Build the live proxy registry.
    pub fn proxy_book(&self) -> ProxyBook {
        self.proxy_methods.iter().map(|(m, b)| (m.clone(), b.clone())).collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::config("listen_addr cannot be empty"));
        }
        if self.allowed_uids.is_empty() {
            return Err(Error::config("at least one client uid must be configured"));
        }
        if self.proxy_methods.is_empty() {
            return Err(Error::config("at least one proxy method must be configured"));
        }
        if self.max_first_packet < 5 {
            return Err(Error::config("max_first_packet cannot hold a record header"));
        }
        if self.first_packet_timeout.is_zero() {
            return Err(Error::config("first_packet_timeout must be positive"));
        }
        Ok(())
    }
}

/// Configuration file format for serialization.
#[derive(Serialize, Deserialize)]
pub struct ServerConfigFile {
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub listen_port: u16,
    /// Server's static secret key (base64)
    pub static_secret_b64: String,
    /// Allowed client UIDs (hex)
    pub allowed_uids: Vec<String>,
    /// First packet timeout (seconds)
    #[serde(default = "default_first_packet_timeout_secs")]
    pub first_packet_timeout_secs: u64,
    /// Largest ClientHello record accepted (bytes)
    #[serde(default = "default_max_first_packet")]
    pub max_first_packet: usize,
    /// Proxy method name to backend address
    #[serde(default)]
    pub proxy_methods: BTreeMap<String, String>,
}

fn default_first_packet_timeout_secs() -> u64 {
    10
}

fn default_max_first_packet() -> usize {
    DEFAULT_MAX_FIRST_PACKET
}

impl ServerConfigFile {
    /// Convert to runtime configuration.
    pub fn to_config(&self) -> Result<ServerConfig> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let secret_bytes = STANDARD
            .decode(&self.static_secret_b64)
            .map_err(|e| Error::config(format!("Invalid base64 secret: {}", e)))?;
        let secret_arr: [u8; 32] = secret_bytes
            .try_into()
            .map_err(|_| Error::config("static_secret must be 32 bytes"))?;

        let mut uids = Vec::with_capacity(self.allowed_uids.len());
        for hex_id in &self.allowed_uids {
            let id_bytes = hex::decode(hex_id)
                .map_err(|e| Error::config(format!("Invalid hex uid: {}", e)))?;
            let uid: [u8; UID_SIZE] = id_bytes
                .try_into()
                .map_err(|_| Error::config(format!("uid must be {} bytes", UID_SIZE)))?;
            uids.push(uid);
        }

        Ok(ServerConfig {
            listen_addr: self.listen_addr.clone(),
            listen_port: self.listen_port,
            static_secret: StaticSecret::from_bytes(secret_arr),
            allowed_uids: uids,
            proxy_methods: self.proxy_methods.clone(),
            first_packet_timeout: Duration::from_secs(self.first_packet_timeout_secs),
            max_first_packet: self.max_first_packet,
        })
    }

    /// Create from runtime configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        use base64::{engine::general_purpose::STANDARD, Engine};

        Self {
            listen_addr: config.listen_addr.clone(),
            listen_port: config.listen_port,
            static_secret_b64: STANDARD.encode(config.static_secret.to_bytes()),
            allowed_uids: config.allowed_uids.iter().map(hex::encode).collect(),
            first_packet_timeout_secs: config.first_packet_timeout.as_secs(),
            max_first_packet: config.max_first_packet,
            proxy_methods: config.proxy_methods.clone(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Render as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}
