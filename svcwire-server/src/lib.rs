//! # svcwire-server
//!
//! Server side of the svcwire transport.
//!
//! This crate provides:
//! - A TCP accept loop with connection limits and graceful shutdown
//! - Per-connection frame decoding and pipelined operation dispatch
//! - The `Router`/`Operation` seam applications plug their services into
//! - Token-based login validation for the optional handshake
//!
//! Operation lookup is deliberately a trait: svcwire routes frames, the
//! application decides what a routing header means.

pub mod auth;
pub mod config;
pub mod error;
pub mod router;
pub mod server;

mod dispatcher;

pub use auth::{login_operation, TokenValidator, LOGIN_OP};
pub use config::{AuthConfig, Config, ConfigError, NetworkConfig};
pub use error::ServerError;
pub use router::{op_fn, Operation, OperationError, RegistryRouter, RouteError, Router};
pub use server::{Server, ServerConfig, ServerStats};
