//! Error types for the device protocol.
//!
//! Everything in [`ClientError`] is recoverable: the variable client retries
//! it and finally degrades to an absent value (get) or `false` (set).

use ventlink_core::ConvertError;

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// A response frame that cannot be interpreted.
///
/// Carries both the request and the raw response for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (request: {}, response: {})", hex::encode(.request), hex::encode(.response))]
pub struct ProtocolError {
    /// What was wrong with the response.
    pub message: String,
    /// Encoded request frame.
    pub request: Vec<u8>,
    /// Raw response bytes as received.
    pub response: Vec<u8>,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>, request: &[u8], response: &[u8]) -> Self {
        Self {
            message: message.into(),
            request: request.to_vec(),
            response: response.to_vec(),
        }
    }
}

/// A request that cannot be encoded into a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit into a single frame.
    #[error("Payload of {len} bytes exceeds the frame limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    /// Register payloads are ASCII only.
    #[error("Payload is not ASCII: {0:?}")]
    NonAscii(String),
}

/// Failure of a single exchange with the device.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The response frame was malformed or did not match the request.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connect, write or read exceeded the configured timeout.
    #[error("Transport timeout during {operation} after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The device answered for a different variable than requested.
    #[error("Variable mismatch: requested {expected}, device answered {received}")]
    VariableMismatch { expected: String, received: String },

    /// The value string could not be decoded.
    #[error("Decode failed: {0}")]
    Decode(#[from] ConvertError),

    /// The request could not be encoded.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub(crate) fn timeout(operation: &'static str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether the error indicates a collision with another transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::VariableMismatch { .. })
    }
}

/// Coordinator initialization failure.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// An identity register could not be read.
    #[error("Failed to read {0} from the device")]
    IdentityUnavailable(&'static str),

    /// The model string contains no airflow figure.
    #[error("Cannot derive maximum air flow from model {0:?}")]
    InvalidModel(String),

    /// The configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ventlink_core::ConfigError),
}
