//! Per-connection handler: authentication, intent routing, and the
//! outbound writer.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Spawn a writer task draining the connection's outbox
//!   2. Receive the first envelope → it must authenticate
//!   3. Loop: receive envelopes → hand intents to the coordinator
//!   4. On exit the guard unbinds the connection; the writer flushes and
//!      closes the socket once the last outbox sender is gone
//!
//! The idle timer in step 3 only sees decoded frames. Control frames are
//! answered inside the transport and never reach it, so keeping a quiet
//! connection open takes an application `heartbeat`.

use std::sync::Arc;

use gridlock_protocol::{ClientMessage, Codec, Envelope, ErrorKind, ProtocolError, ServerMessage};
use gridlock_session::{Authenticator, Outbox};
use gridlock_store::Store;
use gridlock_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::{Actor, Coordinator, GridlockError};

/// Drop guard that unbinds the connection when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
struct ConnectionGuard<A: Authenticator, S: Store> {
    connection: ConnectionId,
    coordinator: Arc<Coordinator<A, S>>,
}

impl<A: Authenticator, S: Store> Drop for ConnectionGuard<A, S> {
    fn drop(&mut self) {
        let connection = self.connection;
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            coordinator.disconnect(connection).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, S, C>>,
) -> Result<(), GridlockError>
where
    A: Authenticator,
    S: Store,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let conn = Arc::new(conn);
    let (outbox, inbox) = mpsc::unbounded_channel();
    tokio::spawn(write_outbox(Arc::clone(&conn), inbox, Arc::clone(&state)));

    // --- Step 1: authenticate ---
    let actor = authenticate(&conn, &state, &outbox).await?;
    let _guard = ConnectionGuard {
        connection: conn_id,
        coordinator: Arc::clone(&state.coordinator),
    };

    // --- Step 2: intent loop ---
    // Pings never reset the idle timer; only text and binary frames do.
    loop {
        let data = match tokio::time::timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, identity = %actor.identity, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, identity = %actor.identity, "connection idle, closing");
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
                reply_error(&outbox, ErrorKind::BadRequest, format!("undecodable message: {e}"));
                continue;
            }
        };

        if let Err(e) = state.coordinator.handle(&actor, envelope.message).await {
            tracing::debug!(%conn_id, seq = envelope.seq, error = %e, "intent rejected");
            reply_error(&outbox, e.kind(), e.to_string());
        }
    }

    // _guard drops here → disconnect fires.
    Ok(())
}

/// Reads the first envelope and authenticates with it.
async fn authenticate<A, S, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, S, C>>,
    outbox: &Outbox,
) -> Result<Actor, GridlockError>
where
    A: Authenticator,
    S: Store,
    C: Codec,
{
    let data = match tokio::time::timeout(state.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before authenticating".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            reply_error(outbox, ErrorKind::Authentication, "authentication timed out");
            return Err(ProtocolError::InvalidMessage("authentication timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            reply_error(outbox, ErrorKind::BadRequest, format!("undecodable message: {e}"));
            return Err(e.into());
        }
    };

    match state
        .coordinator
        .authenticate(conn.id(), outbox.clone(), envelope.message)
        .await
    {
        Ok(actor) => Ok(actor),
        Err(e) => {
            tracing::info!(conn_id = %conn.id(), error = %e, "authentication failed");
            reply_error(outbox, e.kind(), e.to_string());
            Err(e)
        }
    }
}

/// Drains the outbox into the socket, one envelope per event.
///
/// Ends once every sender is dropped, then closes the connection.
async fn write_outbox<A, S, C>(
    conn: Arc<WebSocketConnection>,
    mut inbox: mpsc::UnboundedReceiver<ServerMessage>,
    state: Arc<ServerState<A, S, C>>,
) where
    A: Authenticator,
    S: Store,
    C: Codec,
{
    let conn_id = conn.id();
    let mut seq: u64 = 1;
    while let Some(message) = inbox.recv().await {
        let envelope = Envelope::new(next_seq(&mut seq), message);
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, writer stopping");
            break;
        }
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }
}

fn reply_error(outbox: &Outbox, kind: ErrorKind, message: impl Into<String>) {
    // The writer only goes away after the connection is unbound.
    let _ = outbox.send(ServerMessage::error(kind, message));
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
