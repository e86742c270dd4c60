//! # Cloak handshake
//!
//! The TLS handshake disguise of a censorship-resistant proxy. A Cloak client
//! opens its connection with what looks like an ordinary browser ClientHello;
//! the server authenticates the credentials hidden inside it and answers with
//! a ServerHello that carries the session key in its random field.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  server    listener, config, metrics, session handoff    │
//! ├─────────────────────────────────────────────────────────┤
//! │  cloak     authenticate, check proxy method, reply       │
//! ├─────────────────────────────────────────────────────────┤
//! │  tls       records, ClientHello parser, ServerHello      │
//! ├─────────────────────────────────────────────────────────┤
//! │  crypto    X25519, HKDF, HMAC, key masking               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! To a passive observer the exchange is a normal TLS 1.3 handshake with a
//! server that picked `TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384`. No real TLS is
//! negotiated; the data plane takes over right after the ChangeCipherSpec.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cloak;
pub mod crypto;
pub mod error;
pub mod tls;

#[cfg(feature = "server")]
pub mod server;

pub use error::{Error, Result};
