use std::pin::Pin;
use std::task::{Context, Poll};
use futures::Stream;
use tokio::sync::mpsc;
use crate::error::GenerationError;

/// One item of a prompt's output: the raw bytes of a sampled token, or the
/// error that ended generation.
pub type TokenChunk = Result<Vec<u8>, GenerationError>;

/// # TokenStream
///
/// An asynchronous stream of a single prompt's generated tokens.
///
/// `TokenStream` implements the `Stream` trait from the `futures` crate over
/// a Tokio unbounded channel receiver whose only sender is owned by the
/// engine's worker.
///
/// ## Termination
///
/// - `None` after the last chunk means generation finished normally
/// - a final `Some(Err(_))` means it was cancelled or the backend failed;
///   nothing follows it
///
/// Each `Ok` chunk holds the bytes of exactly one token, which may be part
/// of a multi-byte character. Reassembling characters is up to the consumer.
pub struct TokenStream {
    /// The underlying channel receiver
    receiver: mpsc::UnboundedReceiver<TokenChunk>
}

impl TokenStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<TokenChunk>) -> Self {
        Self {
            receiver,
        }
    }
}

impl Stream for TokenStream {
    type Item = TokenChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_recv(cx)
    }
}
