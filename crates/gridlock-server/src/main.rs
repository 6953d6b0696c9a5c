//! Runs a Gridlock server on the in-memory store.
//!
//! Settings come from `GRIDLOCK_*` environment variables (see
//! [`ServerConfig::from_env`]); log filtering from `RUST_LOG`.

use std::sync::Arc;

use gridlock::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gridlock=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    tracing::info!(bind = %config.bind_addr, grace_secs = config.session.reconnect_grace_secs, "starting gridlock server");

    let store = Arc::new(MemoryStore::new());
    let server = GridlockServerBuilder::new()
        .config(config)
        .build(Arc::clone(&store), store)
        .await?;

    server.run().await?;
    Ok(())
}
