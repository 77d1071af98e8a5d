/// Error types for blackboard operations.
///
/// Most failure modes of the replication layer (unknown keys in peer
/// announcements, missing serializers, duplicate registrations) are handled
/// locally and never show up here. What remains are the errors a caller can
/// actually act on.
use crate::value::ValueKind;
use thiserror::Error;

/// The main error type for blackboard operations.
#[derive(Error, Debug)]
pub enum BlackboardError {
    /// A key handle that this blackboard never issued
    #[error("Unknown key handle {key}")]
    UnknownKey {
        /// The raw handle that was rejected
        key: usize,
    },

    /// Typed extraction from a value holding a different kind
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The kind the caller asked for
        expected: ValueKind,
        /// The kind actually stored
        found: ValueKind,
    },

    /// A serializer failed to encode or decode a value payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Wire message encoding/decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The transport refused a publish or subscribe
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration is structurally invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of what is wrong
        reason: String,
    },
}

impl From<bincode::Error> for BlackboardError {
    fn from(err: bincode::Error) -> Self {
        BlackboardError::Serialization(err.to_string())
    }
}

/// Result type alias for blackboard operations.
pub type BlackboardResult<T> = Result<T, BlackboardError>;
