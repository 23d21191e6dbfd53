//! # Queued Prompt
//!
//! The engine-side half of a prompt. It waits in the pending queue until the
//! worker admits it into a slot, then stays attached to that slot's sequence
//! as the only writer of the prompt's output and metrics.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::{FinishReason, PromptRequest, PromptState, TokenChunk};
use crate::error::GenerationError;

/// The worker's half of a prompt: its input plus the write end of its stream.
#[derive(Debug)]
pub(crate) struct QueuedPrompt {
    request: PromptRequest,
    state: Arc<PromptState>,
    sender: UnboundedSender<TokenChunk>,
}

impl QueuedPrompt {
    pub(crate) fn new(request: PromptRequest, state: Arc<PromptState>, sender: UnboundedSender<TokenChunk>) -> Self {
        Self {
            request,
            state,
            sender,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.state.id()
    }

    pub(crate) fn request(&self) -> &PromptRequest {
        &self.request
    }

    /// Cancelled by the caller, or the caller stopped listening.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.is_cancelled() || self.sender.is_closed()
    }

    /// Writes one token's bytes. A closed stream counts as cancellation.
    pub(crate) fn emit(&self, bytes: Vec<u8>) -> bool {
        if self.sender.send(Ok(bytes)).is_err() {
            self.state.cancel();
            return false;
        }
        true
    }

    pub(crate) fn record_prompting_speed(&self, tokens_per_second: f64) {
        let _ = self.state.prompting_speed.set(tokens_per_second);
    }

    pub(crate) fn record_sampling_speed(&self, tokens_per_second: f64) {
        let _ = self.state.sampling_speed.set(tokens_per_second);
    }

    /// Ends the stream: normally for natural stops, with `Err(Cancelled)` for
    /// cancellation. Failures carry their own error and go through [`fail`](Self::fail).
    pub(crate) fn finish(self, reason: FinishReason) {
        if reason == FinishReason::Cancelled {
            return self.fail(GenerationError::Cancelled);
        }
        let _ = self.state.finish_reason.set(reason);
    }

    /// Ends the stream with a specific error.
    pub(crate) fn fail(self, error: GenerationError) {
        let reason = if error.is_cancelled() {
            FinishReason::Cancelled
        } else {
            FinishReason::BackendFailure
        };
        let _ = self.state.finish_reason.set(reason);
        let _ = self.sender.send(Err(error));
    }
}

impl PartialEq for QueuedPrompt {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for QueuedPrompt {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::channel;
    use crate::sampling::SamplingOptions;
    use futures::StreamExt;

    fn request() -> PromptRequest {
        PromptRequest::new("test input", SamplingOptions::greedy())
    }

    #[tokio::test]
    async fn test_emit_then_finish_normally() {
        let (queued, mut handle) = channel(request());

        assert!(queued.emit(b"x".to_vec()));
        queued.record_prompting_speed(12.5);
        queued.record_sampling_speed(3.0);
        queued.finish(FinishReason::StopToken);

        assert_eq!(handle.next().await, Some(Ok(b"x".to_vec())));
        assert_eq!(handle.next().await, None);
        assert_eq!(handle.finish_reason(), Some(FinishReason::StopToken));
        assert_eq!(handle.metrics().prompting_speed, Some(12.5));
        assert_eq!(handle.metrics().sampling_speed, Some(3.0));
    }

    #[tokio::test]
    async fn test_metrics_are_written_once() {
        let (queued, handle) = channel(request());
        queued.record_prompting_speed(1.0);
        queued.record_prompting_speed(2.0);
        assert_eq!(handle.metrics().prompting_speed, Some(1.0));
    }

    #[tokio::test]
    async fn test_finish_cancelled_sends_marker() {
        let (queued, mut handle) = channel(request());
        queued.finish(FinishReason::Cancelled);

        assert_eq!(handle.next().await, Some(Err(GenerationError::Cancelled)));
        assert_eq!(handle.next().await, None);
        assert_eq!(handle.finish_reason(), Some(FinishReason::Cancelled));
    }

    #[tokio::test]
    async fn test_fail_records_backend_failure() {
        let (queued, mut handle) = channel(request());
        queued.fail(GenerationError::EmptyPrompt);

        assert_eq!(handle.next().await, Some(Err(GenerationError::EmptyPrompt)));
        assert_eq!(handle.finish_reason(), Some(FinishReason::BackendFailure));
    }

    #[test]
    fn test_dropped_handle_counts_as_cancelled() {
        let (queued, handle) = channel(request());
        assert!(!queued.is_cancelled());

        drop(handle);
        assert!(queued.is_cancelled());
        assert!(!queued.emit(b"late".to_vec()));
    }

    #[test]
    fn test_equality_by_id() {
        let (a, _ha) = channel(request());
        let (b, _hb) = channel(request());
        assert_eq!(a, a);
        assert_ne!(a, b);
    }
}
