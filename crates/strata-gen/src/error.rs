use strata_abi::{BackendError, BatchError, Token};
use thiserror::Error;

/// Why a generation request failed. Every variant is fatal for the request;
/// nothing is retried because a failed decode leaves the KV cache undefined.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError {
    #[error("prompt is {prompt_tokens} tokens but the context window holds {n_ctx}")]
    PromptTooLong { prompt_tokens: usize, n_ctx: usize },

    #[error("context overflow at position {position}: {required} positions required, n_ctx = {n_ctx}")]
    ContextOverflow {
        position: usize,
        required: usize,
        n_ctx: usize,
    },

    #[error("batch capacity of {capacity} entries exceeded")]
    CapacityExceeded { capacity: usize },

    #[error("batch misuse: {0}")]
    Batch(BatchError),

    #[error("decode failed at position {position}: {source}")]
    DecodeFailed {
        position: usize,
        #[source]
        source: BackendError,
    },

    #[error("logits vector is empty")]
    EmptyVocabulary,

    #[error("prompt produced no tokens")]
    EmptyPrompt,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("tokenization failed: {0}")]
    Tokenization(#[source] BackendError),

    #[error("logits unavailable at position {position}: {source}")]
    LogitsUnavailable {
        position: usize,
        #[source]
        source: BackendError,
    },

    #[error("piece for token {token:?} at position {position} could not be rendered (backend returned {code})")]
    DetokenizeFailed {
        token: Token,
        position: usize,
        code: i32,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("panic during generation: {0}")]
    Panicked(String),
}

impl From<BatchError> for GenerateError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::CapacityExceeded { capacity } => GenerateError::CapacityExceeded { capacity },
            other => GenerateError::Batch(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerateError>;
