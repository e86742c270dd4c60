//! Cloak Client Binary
//!
//! Usage: cloak-client [OPTIONS]
//!
//! Options:
//!   -t, --handshake <FILE>  Run one disguised handshake against the server
//!   -h, --help              Print help information

use std::env;
use std::time::{Duration, Instant};

use cloak::cloak::{ClientConfig, CloakClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "-h" | "--help" => {
            print_usage();
        }
        "-t" | "--handshake" => {
            if args.len() < 3 {
                eprintln!("Error: --handshake requires a config file path");
                return Ok(());
            }
            test_handshake(&args[2]).await?;
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"Cloak Client - disguised TLS handshake

USAGE:
    cloak-client [OPTIONS]

OPTIONS:
    -t, --handshake <FILE>  Run one handshake using config file
    -h, --help              Print help information

CONFIGURATION FILE FORMAT (JSON):
    {{
        "server_public_key": "<base64>",
        "uid": "<hex>",
        "cover_sni": "www.bing.com",
        "server_addr": "203.0.113.7",
        "server_port": 443,
        "proxy_method": "shadowsocks"
    }}

EXAMPLES:
    Test the handshake:
        cloak-client --handshake client.json
"#
    );
}

async fn test_handshake(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    tracing::info!("Handshaking with {}:{}", config.server_addr, config.server_port);
    tracing::info!("Cover SNI: {}", config.cover_sni);
    tracing::info!("Proxy method: {}", config.proxy_method);

    let client = CloakClient::new(config)?;
    let started = Instant::now();

    match client.connect_with_timeout(Duration::from_secs(10)).await {
        Ok(session) => {
            tracing::info!(
                "Handshake accepted in {:?}, recovered a {}-byte session key",
                started.elapsed(),
                session.session_key.as_bytes().len()
            );
        }
        Err(e) => {
            // The server answers rejected handshakes with silence
            tracing::error!("Handshake failed: {}", e);
        }
    }

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<ClientConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ClientConfig = serde_json::from_str(&content)?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}
