//! Error types for teppan

use thiserror::Error;

use crate::slot::SlotId;

/// Errors reported by an [`InferenceBackend`](crate::backend::InferenceBackend)
/// or a [`ModelLoader`](crate::backend::ModelLoader).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("backend ran out of memory")]
    OutOfMemory,

    #[error("tokenization failed: {0}")]
    Tokenize(String),

    #[error("model load failed: {0}")]
    Load(String),

    /// The call observed its [`AbortSignal`](crate::backend::AbortSignal) and stopped early.
    #[error("operation aborted")]
    Aborted,
}

/// Lifecycle errors raised directly to the caller of the [`Engine`](crate::Engine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("a model is already loaded into this engine")]
    AlreadyLoaded,

    #[error("no model has been loaded into this engine")]
    NotLoaded,

    #[error("failed to load model: {0}")]
    Load(#[source] BackendError),
}

/// Slot pool errors. These never reach callers of the engine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    #[error("no free slot available")]
    NoFreeSlot,

    #[error("slot {0} is not occupied")]
    UnknownSlot(SlotId),
}

/// Terminal error state of a prompt's token stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation was cancelled")]
    Cancelled,

    #[error("backend decode failed: {0}")]
    BackendDecodeFailure(String),

    #[error("prompt could not be tokenized: {0}")]
    Tokenization(String),

    #[error("prompt produced no tokens")]
    EmptyPrompt,

    #[error("prompt of {tokens} tokens does not fit a context of {capacity}")]
    PromptTooLong { tokens: usize, capacity: usize },
}

impl GenerationError {
    /// Whether this is the expected cancellation marker rather than a hard failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled)
    }
}

impl From<BackendError> for GenerationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Aborted => GenerationError::Cancelled,
            BackendError::Tokenize(msg) => GenerationError::Tokenization(msg),
            other => GenerationError::BackendDecodeFailure(other.to_string()),
        }
    }
}
