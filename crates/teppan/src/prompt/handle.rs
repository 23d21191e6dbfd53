use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use uuid::Uuid;

use super::{FinishReason, PromptMetrics, PromptState, TokenChunk, TokenStream};

/// # PromptHandle
///
/// The caller's half of a submitted prompt.
///
/// A handle is itself a [`Stream`] of [`TokenChunk`]s, so the usual
/// `futures::StreamExt` combinators work on it directly. Metrics and the
/// finish reason can be read at any time and become available as the engine
/// records them.
///
/// Dropping the handle cancels the prompt. Use [`PromptHandle::cancel_handle`]
/// to cancel from another task while this one keeps reading.
pub struct PromptHandle {
    state: Arc<PromptState>,
    stream: TokenStream,
}

impl PromptHandle {
    pub(crate) fn new(state: Arc<PromptState>, stream: TokenStream) -> Self {
        Self { state, stream }
    }

    pub fn id(&self) -> Uuid {
        self.state.id()
    }

    /// Requests cancellation. Idempotent; takes effect at the engine's next
    /// iteration, after which the stream yields `Err(Cancelled)` and ends.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: self.state.clone(),
        }
    }

    pub fn metrics(&self) -> PromptMetrics {
        self.state.metrics()
    }

    /// `None` while generation is still running.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.state.finish_reason()
    }

    pub fn tokens(&mut self) -> &mut TokenStream {
        &mut self.stream
    }
}

impl Stream for PromptHandle {
    type Item = TokenChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

impl Drop for PromptHandle {
    fn drop(&mut self) {
        self.state.cancel();
    }
}

impl std::fmt::Debug for PromptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptHandle")
            .field("id", &self.state.id())
            .field("cancelled", &self.state.is_cancelled())
            .field("finish_reason", &self.state.finish_reason())
            .finish()
    }
}

/// Cancels a prompt without owning its stream.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<PromptState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}
