/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away before the operation completed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or completing the upgrade failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}

impl TransportError {
    pub(crate) fn send(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, err))
    }

    pub(crate) fn recv(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::ReceiveFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            err,
        ))
    }
}
