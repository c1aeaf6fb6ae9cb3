use crate::types::{DataType, Rank};

pub type Result<T> = std::result::Result<T, CoalesceError>;

#[derive(Debug, thiserror::Error)]
pub enum CoalesceError {
    #[error("invalid group: rank {rank} with world size {world_size}")]
    InvalidGroup { rank: Rank, world_size: u32 },

    #[error("tensor mismatch: {reason}")]
    TensorMismatch { reason: String },

    #[error("unsupported data type: {dtype:?} for operation {op}")]
    UnsupportedDType { dtype: DataType, op: &'static str },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("{operation} failed at rank {rank}: {reason}")]
    TransportFailure {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoalesceError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `TensorMismatch` error.
    pub fn mismatch(reason: impl Into<String>) -> Self {
        Self::TensorMismatch {
            reason: reason.into(),
        }
    }

    /// True for failures reported by the communication substrate.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure { .. }
                | Self::Transport { .. }
                | Self::Io(_)
                | Self::BufferSizeMismatch { .. }
        )
    }
}
