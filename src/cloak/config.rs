//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::cloak::metadata::MAX_PROXY_METHOD_LEN;
use crate::cloak::UID_SIZE;
use crate::crypto::PublicKey;

/// Configuration for a Cloak client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server's static public key (X25519, base64-encoded for config files)
    #[serde(with = "base64_bytes")]
    pub server_public_key: [u8; 32],

    /// Client UID (8 bytes, hex-encoded for config files)
    #[serde(with = "hex_bytes")]
    pub uid: [u8; UID_SIZE],

    /// SNI hostname to present (e.g., "www.bing.com")
    pub cover_sni: String,

    /// Actual server address to connect to
    pub server_addr: String,

    /// Server port (typically 443)
    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Proxy method to request
    pub proxy_method: String,

    /// Data plane encryption selector
    #[serde(default)]
    pub encryption_method: u8,

    /// Session to open
    #[serde(default)]
    pub session_id: u32,

    /// Supported ALPN protocols
    #[serde(default = "default_alpn")]
    pub alpn: Vec<String>,
}

fn default_port() -> u16 {
    443
}

fn default_alpn() -> Vec<String> {
    vec!["h2".to_string(), "http/1.1".to_string()]
}

impl ClientConfig {
    /// Create a new configuration.
    pub fn new(
        server_public_key: [u8; 32],
        uid: [u8; UID_SIZE],
        cover_sni: impl Into<String>,
        server_addr: impl Into<String>,
        proxy_method: impl Into<String>,
    ) -> Self {
        Self {
            server_public_key,
            uid,
            cover_sni: cover_sni.into(),
            server_addr: server_addr.into(),
            server_port: default_port(),
            proxy_method: proxy_method.into(),
            encryption_method: 0,
            session_id: 0,
            alpn: default_alpn(),
        }
    }

    /// Get the server's public key.
    pub fn server_public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.server_public_key)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cover_sni.is_empty() {
            return Err("cover_sni cannot be empty".to_string());
        }
        if self.server_addr.is_empty() {
            return Err("server_addr cannot be empty".to_string());
        }
        if self.server_public_key == [0u8; 32] {
            return Err("server_public_key cannot be all zeros".to_string());
        }
        if self.proxy_method.is_empty() || self.proxy_method.len() > MAX_PROXY_METHOD_LEN {
            return Err(format!(
                "proxy_method must be 1 to {} bytes",
                MAX_PROXY_METHOD_LEN
            ));
        }
        Ok(())
    }
}

// Custom serde helpers for byte arrays
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("invalid length"))
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 8], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("invalid length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_validation() {
        let config = ClientConfig::new([1u8; 32], [0u8; 8], "www.example.com", "192.168.1.1", "shadowsocks");
        assert!(config.validate().is_ok());

        let bad_key = ClientConfig::new([0u8; 32], [0u8; 8], "www.example.com", "192.168.1.1", "shadowsocks");
        assert!(bad_key.validate().is_err());

        let bad_method = ClientConfig::new([1u8; 32], [0u8; 8], "www.example.com", "192.168.1.1", "");
        assert!(bad_method.validate().is_err());
    }

    #[test]
    fn test_client_config_toml() {
        let config = ClientConfig::new([7u8; 32], [0xab; 8], "www.example.com", "10.0.0.1", "openvpn");
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains(&hex::encode([0xab; 8])));

        let restored: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(restored.server_public_key, [7u8; 32]);
        assert_eq!(restored.uid, [0xab; 8]);
        assert_eq!(restored.proxy_method, "openvpn");
        assert_eq!(restored.server_port, 443);
    }

    #[test]
    fn test_client_config_json() {
        let json = r#"{
            "server_public_key": "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=",
            "uid": "0102030405060708",
            "cover_sni": "www.bing.com",
            "server_addr": "203.0.113.7",
            "server_port": 8443,
            "proxy_method": "shadowsocks"
        }"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_public_key, [1u8; 32]);
        assert_eq!(config.uid, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(config.server_port, 8443);
        assert_eq!(config.session_id, 0);
        assert_eq!(config.alpn, vec!["h2", "http/1.1"]);
        assert!(config.validate().is_ok());

        let short_uid = json.replace("0102030405060708", "0102");
        assert!(serde_json::from_str::<ClientConfig>(&short_uid).is_err());
    }
}
