//! `GridlockServer` builder and server loop.
//!
//! This is the entry point for running a Gridlock server. It ties the
//! layers together: transport → protocol → session → coordinator.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use gridlock_protocol::{Codec, JsonCodec};
use gridlock_session::{Authenticator, SessionConfig};
use gridlock_store::Store;
use gridlock_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Coordinator, CoordinatorConfig, GridlockError, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A, S, C> {
    pub(crate) coordinator: Arc<Coordinator<A, S>>,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Gridlock server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use gridlock::prelude::*;
///
/// # async fn run() -> Result<(), GridlockError> {
/// let store = Arc::new(MemoryStore::new());
/// let server = GridlockServer::<MemoryStore, MemoryStore, JsonCodec>::builder()
///     .bind("0.0.0.0:8080")
///     .build(Arc::clone(&store), store)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct GridlockServerBuilder {
    config: ServerConfig,
}

impl GridlockServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    pub fn coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.config.coordinator = config;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Binds the listener and wires the coordinator to its collaborators.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<A: Authenticator, S: Store>(
        self,
        auth: Arc<A>,
        store: Arc<S>,
    ) -> Result<GridlockServer<A, S, JsonCodec>, GridlockError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let coordinator = Arc::new(Coordinator::new(
            auth,
            store,
            self.config.session,
            self.config.coordinator,
        ));
        let state = Arc::new(ServerState {
            coordinator,
            codec: JsonCodec,
            handshake_timeout: self.config.handshake_timeout,
            idle_timeout: self.config.idle_timeout,
        });
        Ok(GridlockServer {
            transport,
            state,
            sweep_interval: self.config.sweep_interval,
        })
    }
}

impl Default for GridlockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Gridlock server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GridlockServer<A, S, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, S, C>>,
    sweep_interval: Duration,
}

impl<A, S, C> GridlockServer<A, S, C>
where
    A: Authenticator,
    S: Store,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> GridlockServerBuilder {
        GridlockServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, GridlockError> {
        Ok(self.transport.local_addr()?)
    }

    /// The coordinator, for request/response callers such as an HTTP layer.
    pub fn coordinator(&self) -> Arc<Coordinator<A, S>> {
        Arc::clone(&self.state.coordinator)
    }

    /// Runs the accept loop and the periodic sweep.
    ///
    /// Spawns a handler task per accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), GridlockError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Gridlock server running");
        tokio::spawn(sweep_loop(
            Arc::downgrade(&self.state.coordinator),
            self.sweep_interval,
        ));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Sweeps until the coordinator is dropped.
async fn sweep_loop<A: Authenticator, S: Store>(
    coordinator: Weak<Coordinator<A, S>>,
    every: Duration,
) {
    let mut ticks = tokio::time::interval(every);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticks.tick().await;
    loop {
        ticks.tick().await;
        let Some(coordinator) = coordinator.upgrade() else {
            break;
        };
        coordinator.sweep().await;
    }
}
