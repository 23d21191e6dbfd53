//! # Prompts
//!
//! A prompt is one caller request: immutable input text and options, an
//! output stream of token bytes, a cancellation flag and timing metrics.
//!
//! Each prompt is split into two halves at submission:
//!
//! * [`QueuedPrompt`] travels to the engine's worker, which is its only
//!   writer: it emits tokens, records metrics and finishes the stream.
//! * [`PromptHandle`] stays with the caller, who reads tokens, reads metrics
//!   and may cancel.
//!
//! The halves share only a [`PromptState`] made of an atomic flag and
//! write-once cells, plus the single-producer token channel.

mod handle;
mod queue_item;
mod token_stream;

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::sampling::SamplingOptions;

pub use handle::{CancelHandle, PromptHandle};
pub(crate) use queue_item::QueuedPrompt;
pub use token_stream::{TokenChunk, TokenStream};

/// Immutable input of one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub text: String,
    pub options: SamplingOptions,
    /// Prepend the model's beginning-of-sequence token.
    pub prepend_bos: bool,
    /// Parse special/control tokens in `text` rather than treating them as plain text.
    pub process_special_tokens: bool,
}

impl PromptRequest {
    pub fn new(text: impl Into<String>, options: SamplingOptions) -> Self {
        Self {
            text: text.into(),
            options,
            prepend_bos: true,
            process_special_tokens: false,
        }
    }
}

/// Why a prompt's generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The backend sampled an end-of-generation token.
    EndOfGeneration,
    /// A token from `extra_stop_tokens` was sampled.
    StopToken,
    /// `response_max_tokens` tokens were generated.
    MaxTokens,
    /// The sequence filled the context.
    ContextExhausted,
    Cancelled,
    /// Decode failed, or the prompt could not be admitted.
    BackendFailure,
}

impl FinishReason {
    /// Whether the stream ends without an error item.
    pub fn is_normal(self) -> bool {
        !matches!(self, FinishReason::Cancelled | FinishReason::BackendFailure)
    }
}

/// Point-in-time copy of a prompt's timing metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PromptMetrics {
    /// Prompt tokens evaluated per second, set when the first token is sampled.
    pub prompting_speed: Option<f64>,
    /// Generated tokens per second after the first, set when generation stops.
    pub sampling_speed: Option<f64>,
}

/// State shared between the two halves of a prompt.
#[derive(Debug)]
pub(crate) struct PromptState {
    id: Uuid,
    cancelled: AtomicBool,
    prompting_speed: OnceLock<f64>,
    sampling_speed: OnceLock<f64>,
    finish_reason: OnceLock<FinishReason>,
}

impl PromptState {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: AtomicBool::new(false),
            prompting_speed: OnceLock::new(),
            sampling_speed: OnceLock::new(),
            finish_reason: OnceLock::new(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Sets the flag; returns whether this call was the one that set it.
    pub(crate) fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn metrics(&self) -> PromptMetrics {
        PromptMetrics {
            prompting_speed: self.prompting_speed.get().copied(),
            sampling_speed: self.sampling_speed.get().copied(),
        }
    }

    pub(crate) fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason.get().copied()
    }
}

/// Splits a request into its worker half and its caller half.
pub(crate) fn channel(request: PromptRequest) -> (QueuedPrompt, PromptHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(PromptState::new());
    let queued = QueuedPrompt::new(request, state.clone(), tx);
    let handle = PromptHandle::new(state, TokenStream::new(rx));
    (queued, handle)
}
