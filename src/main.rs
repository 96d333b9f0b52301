//! svcwire - pooled, multiplexed binary RPC transport
//!
//! Standalone server binary with builtin ping/echo operations and
//! optional token-based login.

use bytes::Bytes;
use std::sync::Arc;
use svcwire_server::{
    login_operation, Config, RegistryRouter, Server, ServerConfig, TokenValidator, LOGIN_OP,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if SVCWIRE_CONFIG is set, then env overrides)
    let mut config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("SVCWIRE_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("SVCWIRE_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            // Otherwise fall back to defaults
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    // Load auth secrets from external file if configured
    if let Err(e) = config.load_secrets() {
        tracing::error!("Failed to load auth secrets: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting svcwire server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);

    let router = RegistryRouter::new();
    router.register_fn("svc.ping", |_| async move { Ok(Bytes::from_static(b"pong")) });
    router.register_fn("svc.echo", |body| async move { Ok(body) });

    if config.auth.required {
        if config.auth.token_hashes.is_empty() {
            tracing::error!("auth.required=true but no tokens configured!");
            return Err("Authentication required but no tokens configured".into());
        }
        tracing::info!(
            "  Authentication: enabled ({} token(s))",
            config.auth.token_hashes.len()
        );
        let validator = TokenValidator::new(config.auth.token_hashes.clone());
        router.register(LOGIN_OP, login_operation(validator));
    } else {
        tracing::info!("  Authentication: disabled");
    }

    let server_config = ServerConfig::new(config.network.bind_addr)
        .with_idle_timeout(config.network.idle_timeout())
        .with_max_connections(config.network.max_connections);
    let server = Arc::new(Server::new(server_config, Arc::new(router)));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
