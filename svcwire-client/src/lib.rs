//! # svcwire-client
//!
//! Client side of the svcwire transport.
//!
//! This crate provides:
//! - One pooled, multiplexed connection per endpoint, created lazily
//! - A per-connection state machine with an optional login handshake
//! - Request/reply correlation by message id with deadline enforcement
//! - Transparent reconnection after disconnects
//!
//! Callers hand the transport opaque header and body bytes; argument and
//! response marshaling live above this layer.

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod pool;

mod pending;

pub use config::{ClientConfig, LoginConfig};
pub use connection::{ClientConnection, ConnState};
pub use endpoint::Endpoint;
pub use error::ClientError;
pub use pool::ClientPool;
