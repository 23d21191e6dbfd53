use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::error::Elapsed;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::sequence::{Sequence, resolve_stop_tokens};
use crate::backend::{AbortSignal, Batch, InferenceBackend, Token};
use crate::error::{BackendError, GenerationError};
use crate::prompt::{FinishReason, PromptRequest, QueuedPrompt};
use crate::sampling::Candidates;
use crate::slot::{SlotId, SlotPool};

/// State shared between the [`Engine`](super::Engine) and its worker.
pub(crate) struct Shared {
    pub(crate) pending: Mutex<VecDeque<QueuedPrompt>>,
    /// Occupied by the id of the prompt bound to each slot.
    pub(crate) slots: SlotPool<Uuid>,
}

impl Shared {
    pub(crate) fn new(max_parallel: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            slots: SlotPool::new(max_parallel),
        }
    }
}

/// The continuous-batching loop. Owns the backend, the batch buffer and every
/// active [`Sequence`] for the lifetime of the worker.
pub(crate) struct Scheduler<B: InferenceBackend> {
    backend: B,
    shared: Arc<Shared>,
    batch_size: usize,
    batch: Batch,
    sequences: BTreeMap<SlotId, Sequence>,
}

impl<B: InferenceBackend> Scheduler<B> {
    pub(crate) fn new(backend: B, shared: Arc<Shared>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            backend,
            shared,
            batch_size,
            batch: Batch::with_capacity(batch_size),
            sequences: BTreeMap::new(),
        }
    }

    pub(crate) async fn run(mut self, running: Arc<AtomicBool>, notifier: Arc<Notify>) {
        info!(
            slots = self.shared.slots.capacity(),
            batch_size = self.batch_size,
            context_length = self.backend.context_length(),
            "generation worker started"
        );

        loop {
            if !running.load(Ordering::SeqCst) {
                break;
            }

            self.sweep_cancelled_pending();
            self.admit(&running);
            self.evict_cancelled();

            if !self.assemble() {
                // No work to do, wait for notification or check periodically
                let _ = timeout_await_notifier(&notifier).await;
                continue;
            }

            self.dispatch(&running).await;
            tokio::task::yield_now().await;
        }

        self.cancel_everything();
        info!("generation worker stopped");
    }

    /// Completes queued prompts whose callers already gave up.
    fn sweep_cancelled_pending(&mut self) {
        let cancelled: VecDeque<QueuedPrompt> = {
            let mut pending = self.shared.pending.lock();
            if !pending.iter().any(QueuedPrompt::is_cancelled) {
                return;
            }
            let (cancelled, kept) = pending.drain(..).partition(QueuedPrompt::is_cancelled);
            *pending = kept;
            cancelled
        };

        for prompt in cancelled {
            debug!(prompt = %prompt.id(), "dropping cancelled prompt from queue");
            prompt.finish(FinishReason::Cancelled);
        }
    }

    /// Moves queued prompts into free slots, in submission order. Stops as
    /// soon as the worker is told to shut down.
    fn admit(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) && self.shared.slots.has_free_slot() {
            let Some(prompt) = self.shared.pending.lock().pop_front() else {
                break;
            };

            if prompt.is_cancelled() {
                prompt.finish(FinishReason::Cancelled);
                continue;
            }

            let (tokens, stop_tokens) = match self.prepare(prompt.request()) {
                Ok(prepared) => prepared,
                Err(err) => {
                    warn!(prompt = %prompt.id(), error = %err, "rejecting prompt");
                    prompt.fail(err);
                    continue;
                }
            };

            let slot = match self.shared.slots.acquire(prompt.id()) {
                Ok(slot) => slot,
                Err(err) => {
                    debug!(error = %err, "slot vanished during admission, requeueing");
                    self.shared.pending.lock().push_front(prompt);
                    break;
                }
            };

            debug!(prompt = %prompt.id(), %slot, tokens = tokens.len(), "admitted prompt");
            let capacity = self.backend.context_length();
            self.sequences
                .insert(slot, Sequence::new(slot, prompt, tokens, stop_tokens, capacity));
        }
    }

    fn prepare(&self, request: &PromptRequest) -> Result<(Vec<Token>, HashSet<Token>), GenerationError> {
        let tokens = self
            .backend
            .tokenize(&request.text, request.prepend_bos, request.process_special_tokens)?;
        if tokens.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let capacity = self.backend.context_length();
        if tokens.len() >= capacity.saturating_sub(1) {
            return Err(GenerationError::PromptTooLong {
                tokens: tokens.len(),
                capacity,
            });
        }

        let stop_tokens = resolve_stop_tokens(&self.backend, &request.options.extra_stop_tokens);
        Ok((tokens, stop_tokens))
    }

    fn evict_cancelled(&mut self) {
        let cancelled: Vec<SlotId> = self
            .sequences
            .iter()
            .filter(|(_, sequence)| sequence.is_cancelled())
            .map(|(slot, _)| *slot)
            .collect();

        for slot in cancelled {
            if let Some(sequence) = self.evict(slot) {
                sequence.finish(FinishReason::Cancelled);
            }
        }
    }

    /// Refills the batch from every active sequence in slot order. Returns
    /// whether there is anything to decode.
    fn assemble(&mut self) -> bool {
        self.batch.clear();
        for sequence in self.sequences.values_mut() {
            sequence.schedule(&mut self.batch);
        }
        !self.batch.is_empty()
    }

    /// Decodes the batch chunk by chunk, sampling after each chunk. Shutdown
    /// is checked before every decode and before every sampling pass, so a
    /// backend that ignores the abort signal still stops within one chunk.
    async fn dispatch(&mut self, running: &Arc<AtomicBool>) {
        let abort = AbortSignal::new(running.clone());
        let chunks: Vec<Range<usize>> = self.batch.chunks(self.batch_size).map(|view| view.range()).collect();

        for chunk in chunks {
            if abort.is_aborted() {
                debug!(start = chunk.start, "shutdown before decoding chunk");
                return;
            }

            let view = self.batch.view(chunk.clone());
            trace!(start = chunk.start, len = view.len(), "decoding chunk");
            if let Err(err) = self.backend.decode(view, &abort).await {
                if abort.is_aborted() {
                    debug!("decode aborted by shutdown");
                } else {
                    self.fail_all(err);
                }
                return;
            }

            if abort.is_aborted() {
                debug!(start = chunk.start, "shutdown before sampling chunk");
                return;
            }
            self.sample_chunk(&chunk);
        }
    }

    /// Samples every sequence whose logits position lies in `chunk`, then
    /// evicts the ones that stopped.
    fn sample_chunk(&mut self, chunk: &Range<usize>) {
        let mut stopped: Vec<(SlotId, FinishReason)> = vec![];
        let mut missing: Vec<SlotId> = vec![];
        let view = self.batch.view(chunk.clone());

        for (slot, sequence) in self.sequences.iter_mut() {
            let Some(index) = sequence.take_logit_in(&view) else {
                continue;
            };
            if sequence.is_cancelled() {
                stopped.push((*slot, FinishReason::Cancelled));
                continue;
            }

            let mut candidates = match self.backend.logits(index) {
                Some(row) => Candidates::from_logits(row),
                None => {
                    missing.push(*slot);
                    continue;
                }
            };

            let token = sequence.sample(&mut self.backend, &mut candidates);
            let end_of_generation = self.backend.is_end_of_generation(token);
            let backend = &self.backend;
            if let Some(reason) = sequence.accept(token, end_of_generation, |token| backend.token_to_bytes(token)) {
                stopped.push((*slot, reason));
            }
        }

        for (slot, reason) in stopped {
            if let Some(sequence) = self.evict(slot) {
                debug!(
                    %slot,
                    ?reason,
                    generated = sequence.generated(),
                    tokens = sequence.pos_tokens(),
                    "sequence finished"
                );
                sequence.finish(reason);
            }
        }
        for slot in missing {
            if let Some(sequence) = self.evict(slot) {
                warn!(%slot, "backend returned no logits for sequence");
                sequence.fail(GenerationError::BackendDecodeFailure("no logits for sequence".into()));
            }
        }
    }

    /// Fails every active sequence after a decode error and drops the whole
    /// key/value cache.
    fn fail_all(&mut self, err: BackendError) {
        warn!(error = %err, active = self.sequences.len(), "decode failed, evicting all sequences");

        let sequences = std::mem::take(&mut self.sequences);
        self.shared.slots.release_where(|slot, _| sequences.contains_key(&slot));
        self.backend.clear_cache();

        let message = err.to_string();
        for sequence in sequences.into_values() {
            sequence.fail(GenerationError::BackendDecodeFailure(message.clone()));
        }
    }

    /// Removes a sequence, purges its cache entries and frees its slot.
    fn evict(&mut self, slot: SlotId) -> Option<Sequence> {
        let sequence = self.sequences.remove(&slot)?;
        self.backend.remove_sequence(slot);
        if let Err(err) = self.shared.slots.release(slot) {
            warn!(error = %err, "slot was not occupied at eviction");
        }
        Some(sequence)
    }

    fn cancel_everything(&mut self) {
        let slots: Vec<SlotId> = self.sequences.keys().copied().collect();
        for slot in slots {
            if let Some(sequence) = self.evict(slot) {
                sequence.finish(FinishReason::Cancelled);
            }
        }

        let pending: Vec<QueuedPrompt> = self.shared.pending.lock().drain(..).collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "cancelling queued prompts");
        }
        for prompt in pending {
            prompt.finish(FinishReason::Cancelled);
        }
    }
}

#[inline]
async fn timeout_await_notifier(notifier: &Notify) -> Result<(), Elapsed> {
    tokio::time::timeout(Duration::from_millis(100), notifier.notified()).await
}
