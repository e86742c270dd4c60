//! Cloak Server Binary
//!
//! Usage: cloak-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   -g, --generate       Generate new server configuration
//!   -h, --help           Print help information

use std::env;
use std::sync::Arc;

use cloak::server::{EstablishedSession, Server, ServerConfig, ServerConfigFile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
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
        "-g" | "--generate" => {
            generate_config()?;
        }
        "-c" | "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a file path");
                return Ok(());
            }
            run_server(&args[2]).await?;
        }
        "--show-pubkey" => {
            if args.len() < 3 {
                eprintln!("Error: --show-pubkey requires a config file path");
                return Ok(());
            }
            show_pubkey(&args[2])?;
        }
        "--add-client" => {
            if args.len() < 3 {
                eprintln!("Error: --add-client requires a config file path");
                return Ok(());
            }
            add_client(&args[2])?;
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
        r#"Cloak Server - disguised TLS handshake endpoint

USAGE:
    cloak-server [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file
    -g, --generate          Generate new server configuration
    --show-pubkey <FILE>    Show server public key from existing config
    --add-client <FILE>     Generate a new client UID and update config
    -h, --help              Print help information

EXAMPLES:
    Generate a new configuration:
        cloak-server --generate > server.toml

    Run the server:
        cloak-server --config server.toml

    Show public key for clients:
        cloak-server --show-pubkey server.toml

    Add a new client:
        cloak-server --add-client server.toml
"#
    );
}

fn load_config_file(config_path: &str) -> anyhow::Result<ServerConfigFile> {
    let content = std::fs::read_to_string(config_path)?;
    Ok(ServerConfigFile::from_toml(&content)?)
}

fn generate_config() -> anyhow::Result<()> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let mut config = ServerConfig::new_random("0.0.0.0", 443);
    config.add_proxy_method("shadowsocks", "127.0.0.1:8388");
    let uid = config.generate_client_uid();
    let public_key = config.public_key();

    let config_file = ServerConfigFile::from_config(&config);

    println!("# Cloak Server Configuration");
    println!("# Generated: {}", chrono::Utc::now());
    println!();
    println!("{}", config_file.to_toml()?);
    println!();
    println!("# Client connection info (put these in client.json):");
    println!("# Server Public Key (base64): {}", STANDARD.encode(public_key.as_bytes()));
    println!("# UID (hex): {}", hex::encode(uid));

    Ok(())
}

fn show_pubkey(config_path: &str) -> anyhow::Result<()> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let config = load_config_file(config_path)?.to_config()?;
    let public_key = config.public_key();

    println!("Server Public Key (base64): {}", STANDARD.encode(public_key.as_bytes()));
    println!();
    println!("Allowed UIDs (hex):");
    for (i, uid) in config.allowed_uids.iter().enumerate() {
        println!("  [{}] {}", i + 1, hex::encode(uid));
    }
    println!();
    println!("Proxy methods:");
    for (method, backend) in &config.proxy_methods {
        println!("  {} -> {}", method, backend);
    }

    Ok(())
}

fn add_client(config_path: &str) -> anyhow::Result<()> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let mut config = load_config_file(config_path)?.to_config()?;
    let uid = config.generate_client_uid();
    let public_key = config.public_key();

    // Write updated config back
    let mut output = String::new();
    output.push_str("# Cloak Server Configuration\n\n");
    output.push_str(&ServerConfigFile::from_config(&config).to_toml()?);
    std::fs::write(config_path, &output)?;

    let method = config
        .proxy_methods
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "shadowsocks".to_string());

    println!("New client added successfully!");
    println!();
    println!("Give your friend this client.json:");
    println!();
    println!("{{");
    println!("    \"server_public_key\": \"{}\",", STANDARD.encode(public_key.as_bytes()));
    println!("    \"uid\": \"{}\",", hex::encode(uid));
    println!("    \"cover_sni\": \"www.bing.com\",");
    println!("    \"server_addr\": \"YOUR_SERVER_IP\",");
    println!("    \"server_port\": {},", config.listen_port);
    println!("    \"proxy_method\": \"{}\"", method);
    println!("}}");

    Ok(())
}

async fn run_server(config_path: &str) -> anyhow::Result<()> {
    let config = load_config_file(config_path)?.to_config()?;
    config.validate()?;

    tracing::info!("Starting Cloak server on {}:{}", config.listen_addr, config.listen_port);
    tracing::info!("Allowed UIDs: {}", config.allowed_uids.len());
    for (method, backend) in &config.proxy_methods {
        tracing::info!("Proxy method {} -> {}", method, backend);
    }

    let (server, mut sessions) = Server::new(config);
    let server = Arc::new(server);

    let relay_server = Arc::clone(&server);
    tokio::spawn(async move {
        while let Some(session) = sessions.recv().await {
            let backend = relay_server.state().proxy_book.backend(&session.proxy_method);
            tokio::spawn(relay(session, backend));
        }
    });

    server.run().await?;

    Ok(())
}

/// Hand an established session's stream to the backend of its proxy method.
async fn relay(session: EstablishedSession, backend: Option<String>) {
    let EstablishedSession {
        peer_addr,
        session_id,
        proxy_method,
        mut stream,
        ..
    } = session;

    let Some(backend) = backend else {
        tracing::warn!("Proxy method {} was removed, dropping session {}", proxy_method, session_id);
        return;
    };

    let mut upstream = match tokio::net::TcpStream::connect(&backend).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!("Backend {} unreachable: {}", backend, e);
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut stream, &mut upstream).await {
        Ok((up, down)) => {
            tracing::debug!("Session {} from {} closed ({} up, {} down)", session_id, peer_addr, up, down)
        }
        Err(e) => tracing::debug!("Session {} from {} ended: {}", session_id, peer_addr, e),
    }
}
