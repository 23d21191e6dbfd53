use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;

use super::{AbortSignal, BatchView, InferenceBackend, LoadProgress, ModelLoader, Sampler, Token};
use crate::config::ModelOptions;
use crate::error::BackendError;
use crate::sampling::Candidates;
use crate::slot::SlotId;

pub const BOS: Token = 256;
pub const EOS: Token = 257;
const VOCAB: usize = 258;

/// Something the mock observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A prompt was tokenized with BOS, i.e. admitted.
    Admit(String),
    Decode { slots: Vec<SlotId>, len: usize },
    Remove(SlotId),
    Clear,
}

/// Shared handle for inspecting and steering a [`MockBackend`] after it has
/// moved into the engine.
#[derive(Clone, Default)]
pub struct MockRecorder {
    events: Arc<Mutex<Vec<Event>>>,
    fail_decodes: Arc<AtomicUsize>,
}

impl MockRecorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn decode_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Event::Decode { .. }))
            .count()
    }

    /// Makes the next `count` decode calls fail.
    pub fn fail_next_decodes(&self, count: usize) {
        self.fail_decodes.store(count, Ordering::SeqCst);
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Byte-level backend whose "model" always predicts the next lowercase letter.
///
/// BOS is followed by `a`, each letter `a..y` by its successor, and `z` or
/// anything else by EOS. Sampling primitives are deterministic.
pub struct MockBackend {
    context_length: usize,
    recorder: MockRecorder,
    decode_delay: Option<Duration>,
    ignore_abort: bool,
    rows: Vec<Option<Vec<f32>>>,
}

impl MockBackend {
    pub fn new(context_length: usize, recorder: MockRecorder) -> Self {
        Self {
            context_length,
            recorder,
            decode_delay: None,
            ignore_abort: false,
            rows: vec![],
        }
    }

    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = Some(delay);
        self
    }

    /// Keeps decoding after shutdown, like a native library without an abort hook.
    pub fn ignoring_abort(mut self) -> Self {
        self.ignore_abort = true;
        self
    }

    pub fn successor(token: Token) -> Token {
        match token {
            BOS => b'a' as Token,
            t if (b'a' as Token..b'z' as Token).contains(&t) => t + 1,
            _ => EOS,
        }
    }

    fn row_for(token: Token) -> Vec<f32> {
        let mut row = vec![0.0; VOCAB];
        row[Self::successor(token) as usize] = 10.0;
        row
    }
}

impl Sampler for MockBackend {
    fn apply_penalties(&mut self, _: &mut Candidates, _: &[Token], _: f32, _: f32, _: f32) {}

    fn softmax(&mut self, candidates: &mut Candidates) {
        candidates.sort_by_logit();
        let max = candidates.first().map(|d| d.logit).unwrap_or(0.0);
        let mut sum = 0.0;
        for d in candidates.as_mut_slice() {
            d.p = (d.logit - max).exp();
            sum += d.p;
        }
        for d in candidates.as_mut_slice() {
            d.p /= sum;
        }
    }

    fn greedy(&mut self, candidates: &mut Candidates) -> Token {
        candidates.argmax().unwrap_or(EOS)
    }

    fn top_k(&mut self, _: &mut Candidates, _: i32, _: usize) {}

    fn tail_free(&mut self, _: &mut Candidates, _: f32, _: usize) {}

    fn typical(&mut self, _: &mut Candidates, _: f32, _: usize) {}

    fn top_p(&mut self, _: &mut Candidates, _: f32, _: usize) {}

    fn min_p(&mut self, _: &mut Candidates, _: f32, _: usize) {}

    fn temperature(&mut self, _: &mut Candidates, _: f32) {}

    fn sample(&mut self, candidates: &mut Candidates, _: &mut dyn RngCore) -> Token {
        self.greedy(candidates)
    }

    fn mirostat(&mut self, candidates: &mut Candidates, _: f32, eta: f32, _: usize, mu: &mut f32, _: &mut dyn RngCore) -> Token {
        *mu -= eta;
        self.greedy(candidates)
    }

    fn mirostat_v2(&mut self, candidates: &mut Candidates, _: f32, eta: f32, mu: &mut f32, _: &mut dyn RngCore) -> Token {
        *mu -= eta;
        self.greedy(candidates)
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn context_length(&self) -> usize {
        self.context_length
    }

    fn tokenize(&self, text: &str, add_bos: bool, _special: bool) -> Result<Vec<Token>, BackendError> {
        if add_bos {
            self.recorder.record(Event::Admit(text.to_string()));
        }
        let mut tokens = Vec::with_capacity(text.len() + 1);
        if add_bos {
            tokens.push(BOS);
        }
        tokens.extend(text.bytes().map(Token::from));
        Ok(tokens)
    }

    fn token_to_bytes(&self, token: Token) -> Vec<u8> {
        match u8::try_from(token) {
            Ok(byte) => vec![byte],
            Err(_) => vec![],
        }
    }

    fn is_end_of_generation(&self, token: Token) -> bool {
        token == EOS
    }

    async fn decode(&mut self, batch: BatchView<'_>, abort: &AbortSignal) -> Result<(), BackendError> {
        if let Some(delay) = self.decode_delay {
            tokio::time::sleep(delay).await;
        }
        if abort.is_aborted() && !self.ignore_abort {
            return Err(BackendError::Aborted);
        }
        self.rows.clear();

        let failed = self
            .recorder
            .fail_decodes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::Decode("injected failure".into()));
        }

        let mut slots: Vec<SlotId> = vec![];
        for slot in batch.slots() {
            if !slots.contains(slot) {
                slots.push(*slot);
            }
        }
        self.recorder.record(Event::Decode { slots, len: batch.len() });

        self.rows = batch
            .tokens()
            .iter()
            .zip(batch.logits())
            .map(|(token, wanted)| wanted.then(|| Self::row_for(*token)))
            .collect();
        Ok(())
    }

    fn logits(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index)?.as_deref()
    }

    fn remove_sequence(&mut self, slot: SlotId) {
        self.recorder.record(Event::Remove(slot));
    }

    fn clear_cache(&mut self) {
        self.recorder.record(Event::Clear);
    }
}

/// Loader handing out one pre-built [`MockBackend`].
pub struct MockLoader {
    backend: Mutex<Option<MockBackend>>,
}

impl MockLoader {
    pub fn new(backend: MockBackend) -> Self {
        Self { backend: Mutex::new(Some(backend)) }
    }
}

impl ModelLoader for MockLoader {
    type Backend = MockBackend;

    fn load(&self, _path: &Path, options: &ModelOptions, progress: &mut LoadProgress<'_>) -> Result<MockBackend, BackendError> {
        for percent in [0.0, 50.0, 100.0] {
            if !progress.report(percent) {
                return Err(BackendError::Aborted);
            }
        }
        let mut backend = self
            .backend
            .lock()
            .take()
            .ok_or_else(|| BackendError::Load("mock backend already handed out".into()))?;
        backend.context_length = backend.context_length.min(options.context_length);
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Batch;

    #[test]
    fn test_successor_chain() {
        assert_eq!(MockBackend::successor(BOS), b'a' as Token);
        assert_eq!(MockBackend::successor(b'c' as Token), b'd' as Token);
        assert_eq!(MockBackend::successor(b'z' as Token), EOS);
        assert_eq!(MockBackend::successor(b'!' as Token), EOS);
    }

    #[tokio::test]
    async fn test_decode_only_fills_requested_rows() {
        let mut backend = MockBackend::new(64, MockRecorder::default());
        let mut batch = Batch::default();
        batch.push(BOS, 0, SlotId(0), false);
        batch.push(b'a' as Token, 1, SlotId(0), true);

        backend.decode(batch.view(0..2), &AbortSignal::never()).await.unwrap();

        assert!(backend.logits(0).is_none());
        let mut candidates = Candidates::from_logits(backend.logits(1).unwrap());
        assert_eq!(backend.greedy(&mut candidates), b'b' as Token);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let recorder = MockRecorder::default();
        let mut backend = MockBackend::new(64, recorder.clone());
        let mut batch = Batch::default();
        batch.push(BOS, 0, SlotId(0), true);

        recorder.fail_next_decodes(1);
        assert!(backend.decode(batch.view(0..1), &AbortSignal::never()).await.is_err());
        assert!(backend.decode(batch.view(0..1), &AbortSignal::never()).await.is_ok());
    }
}
