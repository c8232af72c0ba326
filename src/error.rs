//! Error types for urlink

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// urlink error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be written
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Frame length disagrees with the bytes received (recoverable, resync)
    #[error("Framing error: {0}")]
    Framing(String),

    /// Payload does not match the negotiated schema (session fatal)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Telemetry field name not known to the state model
    #[error("Unknown telemetry field: {0}")]
    UnknownField(String),

    /// Handshake step failed
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Invalid packet or payload
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Communication timeout
    #[error("Communication timeout")]
    Timeout,

    /// Operation requires an established session
    #[error("Not connected")]
    NotConnected,

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    Disconnected,

    /// Outbound frame queue is full
    #[error("Send queue full")]
    SendQueueFull,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
