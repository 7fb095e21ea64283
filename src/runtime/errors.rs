//! Error types for the runtime system

use crossbeam_channel::{RecvError, SendError};
use std::any::TypeId;

/// Error type for port operations
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Port '{0}' not found on node '{1}'")]
    NotFound(String, String),

    #[error("Port index {0} out of range for node '{1}'")]
    IndexOutOfRange(usize, String),
}

/// Error type for connection operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Type mismatch: {from_node}.{from_port} ({from_type:?}) -> {to_node}.{to_port} ({to_type:?})")]
    TypeMismatch {
        from_node: String,
        from_port: String,
        from_type: TypeId,
        to_node: String,
        to_port: String,
        to_type: TypeId,
    },

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Port '{port}' not found on node '{node}'")]
    PortNotFound { node: String, port: String },

    #[error("{0}")]
    DuplicateConnection(String),
}

/// Configuration problems detected before a decode run consumes any sample.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot decode without samplerate")]
    MissingSampleRate,

    #[error("Capture samplerate {capture} Hz must be a multiple of library samplerate {library} Hz")]
    RateMismatch { capture: u64, library: u64 },

    #[error("Decoder '{decoder}' has no option '{option}'")]
    UnknownOption { decoder: String, option: String },

    #[error("Invalid value '{value}' for option '{option}' (allowed: {allowed})")]
    InvalidOptionValue {
        option: String,
        value: String,
        allowed: String,
    },

    #[error("Decoder '{decoder}' needs {expected} channel(s), stream has {actual}")]
    ChannelCount {
        decoder: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid secret '{0}': expected 16 hex digits")]
    InvalidSecret(String),

    #[error("Inconsistent descriptor for '{decoder}': {reason}")]
    Descriptor { decoder: String, reason: String },
}

/// Error type for work function operations
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("Failed to receive from input channel: {0}")]
    RecvError(#[from] RecvError),

    #[error("Failed to send to output channel: {0}")]
    SendError(String),

    #[error("Node-specific error: {0}")]
    NodeError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Inconsistent tables or malformed upstream data; the run is aborted.
    #[error("Consistency defect: {0}")]
    Defect(String),

    #[error("Shutdown signal received")]
    Shutdown,
}

impl WorkError {
    /// Whether this error marks a clean end of stream rather than a failure.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, WorkError::Shutdown)
    }
}

impl<T> From<SendError<T>> for WorkError {
    fn from(e: SendError<T>) -> Self {
        WorkError::SendError(format!("{}", e))
    }
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;
