//! Networking error types.

use thiserror::Error;

/// Result type for networking operations.
pub type NetResult<T> = Result<T, NetError>;

/// Errors raised by the client socket and the classical channel.
#[derive(Debug, Error)]
pub enum NetError {
    /// Binding the listening socket failed.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },

    /// Accepting a client connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Connecting to a peer endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// Sending a frame failed, typically because the peer is gone.
    ///
    /// On the client path the QPU logs this and drops the reply instead of
    /// dying with the client.
    #[error("failed to send to {target}: {source}")]
    Send {
        target: String,
        source: std::io::Error,
    },

    /// No dealer socket exists for the requested target.
    #[error("no connection established with peer {0}")]
    UnknownPeer(String),

    /// A reply was attempted with no pending request to answer.
    #[error("no pending client to reply to")]
    NoPendingClient,

    /// The channel's inbound queue shut down (all reader threads gone).
    #[error("classical channel receive side closed")]
    ChannelClosed,

    /// A peer sent a measurement frame that is not a decimal integer.
    #[error("malformed measurement payload: {0:?}")]
    BadMeasurement(String),

    /// Generic I/O failure.
    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),
}
