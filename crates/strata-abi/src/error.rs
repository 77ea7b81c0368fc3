use thiserror::Error;

/// Failures reported by a backend handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("tokenize failed: {0}")]
    Tokenize(String),

    #[error("decode returned status {code}")]
    Decode { code: i32 },

    #[error("no logits available for batch index {index}")]
    LogitsUnavailable { index: usize },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Batch packing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch is full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },

    #[error("batch index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}
