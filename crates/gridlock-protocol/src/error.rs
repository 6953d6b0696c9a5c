//! Error types for the protocol layer.

/// Errors raised while encoding, decoding, or validating wire values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not a well-formed message of the expected type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A value parsed fine but breaks a wire rule, for example a
    /// registered id that uses the reserved guest prefix.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
