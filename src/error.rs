//! Error types for predictwire.

use thiserror::Error;

/// Main error type for server, client and wire operations.
#[derive(Debug, Error)]
pub enum ServeError {
    /// I/O error on the listener or a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error (envelope encoding).
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error (envelope decoding).
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (bad header, oversized payload, unexpected frame).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Route registration or lookup failure.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Lifecycle call made in the wrong state (e.g. `start` twice).
    #[error("Server state error: {0}")]
    State(&'static str),

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Route table errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Request path has no registered route.
    #[error("Unknown service path: {path}, all paths is {known:?}")]
    UnknownPath { path: String, known: Vec<String> },

    /// A route with the same path was already registered.
    #[error("Duplicate service path: {0}")]
    DuplicatePath(String),
}

/// Content decode errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The populated content variant does not match the codec.
    #[error("{codec} codec cannot decode {found} content")]
    TagMismatch {
        codec: &'static str,
        found: &'static str,
    },

    /// Tensor shape, dtype and data disagree.
    #[error("Malformed tensor: {0}")]
    MalformedTensor(String),

    /// The JSON payload is not valid JSON.
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// The value handed to an encoder has the wrong kind.
    #[error("{codec} codec cannot encode a {found} value")]
    Unencodable {
        codec: &'static str,
        found: &'static str,
    },
}

/// Result type alias using ServeError.
pub type Result<T> = std::result::Result<T, ServeError>;
