use std::collections::HashSet;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::trace;

use crate::backend::{Batch, BatchView, InferenceBackend, Sampler, Token};
use crate::error::GenerationError;
use crate::prompt::{FinishReason, QueuedPrompt};
use crate::sampling::{Candidates, MirostatState, sample};
use crate::slot::SlotId;

/// Generation state of one admitted prompt, bound to one slot.
///
/// `tokens` holds the prompt followed by every accepted generated token, so
/// its length is the `pos_tokens` cursor. Cursors keep
/// `pos_batch <= pos_tokens <= capacity`.
pub(crate) struct Sequence {
    slot: SlotId,
    prompt: QueuedPrompt,
    tokens: Vec<Token>,
    capacity: usize,
    /// Tokens already placed into a batch.
    pos_batch: usize,
    /// Batch index whose logits this sequence samples from, for the current
    /// batch only.
    pos_logit: Option<usize>,
    /// Where the prompt ends and the response begins.
    pos_response: usize,
    mirostat: MirostatState,
    stop_tokens: HashSet<Token>,
    rng: StdRng,
    started: Instant,
    prompt_end: Option<Instant>,
    generated: usize,
}

impl Sequence {
    pub(crate) fn new(
        slot: SlotId,
        prompt: QueuedPrompt,
        prompt_tokens: Vec<Token>,
        stop_tokens: HashSet<Token>,
        capacity: usize,
    ) -> Self {
        let options = &prompt.request().options;
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mirostat = MirostatState::new(options.mirostat_tau);

        let mut tokens = Vec::with_capacity(capacity);
        tokens.extend(prompt_tokens);
        let pos_response = tokens.len();

        Self {
            slot,
            prompt,
            tokens,
            capacity,
            pos_batch: 0,
            pos_logit: None,
            pos_response,
            mirostat,
            stop_tokens,
            rng,
            started: Instant::now(),
            prompt_end: None,
            generated: 0,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.prompt.is_cancelled()
    }

    pub(crate) fn pos_tokens(&self) -> usize {
        self.tokens.len()
    }

    pub(crate) fn generated(&self) -> usize {
        self.generated
    }

    /// Appends every token not yet batched, asking for logits on the last one.
    ///
    /// Returns whether anything was appended.
    pub(crate) fn schedule(&mut self, batch: &mut Batch) -> bool {
        let pending = self.pos_batch..self.tokens.len();
        if pending.is_empty() {
            self.pos_logit = None;
            return false;
        }

        let mut last = None;
        for position in pending {
            last = Some(batch.push(self.tokens[position], position, self.slot, false));
        }
        if let Some(index) = last {
            batch.request_logits(index);
        }
        self.pos_logit = last;
        self.pos_batch = self.tokens.len();
        true
    }

    /// The view-local index to sample from if this sequence's logits lie
    /// inside `view`. Consumes it.
    pub(crate) fn take_logit_in(&mut self, view: &BatchView<'_>) -> Option<usize> {
        let local = view.local_index(self.pos_logit?)?;
        self.pos_logit = None;
        Some(local)
    }

    /// Runs the sampling pipeline with this sequence's options, history,
    /// mirostat state and generator.
    pub(crate) fn sample<S>(&mut self, sampler: &mut S, candidates: &mut Candidates) -> Token
    where
        S: Sampler + ?Sized,
    {
        if self.prompt_end.is_none() {
            let now = Instant::now();
            self.prompt.record_prompting_speed(rate(self.pos_response, now - self.started));
            self.prompt_end = Some(now);
        }

        sample(
            sampler,
            candidates,
            &self.prompt.request().options,
            &self.tokens,
            &mut self.mirostat,
            &mut self.rng,
        )
    }

    /// Accepts a freshly sampled token.
    ///
    /// A token that itself ends generation is discarded, as is any token past
    /// `response_max_tokens` (so a limit of zero emits nothing). Otherwise it
    /// is appended and its bytes emitted before the length limits are checked.
    /// Returns why the sequence must stop, if it must.
    pub(crate) fn accept<F>(&mut self, token: Token, end_of_generation: bool, to_bytes: F) -> Option<FinishReason>
    where
        F: FnOnce(Token) -> Vec<u8>,
    {
        if self.is_cancelled() {
            return Some(FinishReason::Cancelled);
        }
        if end_of_generation {
            return Some(FinishReason::EndOfGeneration);
        }
        if self.stop_tokens.contains(&token) {
            return Some(FinishReason::StopToken);
        }
        if self.reached_max_tokens() {
            return Some(FinishReason::MaxTokens);
        }

        self.tokens.push(token);
        self.generated += 1;
        trace!(slot = %self.slot, token, generated = self.generated, "accepted token");

        if !self.prompt.emit(to_bytes(token)) {
            return Some(FinishReason::Cancelled);
        }
        if self.tokens.len() >= self.capacity.saturating_sub(1) {
            return Some(FinishReason::ContextExhausted);
        }
        self.reached_max_tokens().then_some(FinishReason::MaxTokens)
    }

    fn reached_max_tokens(&self) -> bool {
        matches!(self.prompt.request().options.response_max_tokens, Some(max) if self.generated >= max)
    }

    /// Records the sampling speed and completes the prompt's stream.
    pub(crate) fn finish(self, reason: FinishReason) {
        if let Some(prompt_end) = self.prompt_end {
            self.prompt
                .record_sampling_speed(rate(self.generated.saturating_sub(1), prompt_end.elapsed()));
        }
        self.prompt.finish(reason);
    }

    pub(crate) fn fail(self, error: GenerationError) {
        self.prompt.fail(error);
    }
}

/// Resolves stop strings to token ids. Strings that do not tokenize to
/// exactly one token are dropped.
pub(crate) fn resolve_stop_tokens<B>(backend: &B, stops: &[String]) -> HashSet<Token>
where
    B: InferenceBackend + ?Sized,
{
    stops
        .iter()
        .filter_map(|stop| match backend.tokenize(stop, false, true) {
            Ok(tokens) if tokens.len() == 1 => Some(tokens[0]),
            _ => {
                trace!(stop = %stop, "ignoring stop string that is not a single token");
                None
            }
        })
        .collect()
}

fn rate(count: usize, elapsed: std::time::Duration) -> f64 {
    count as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
}
