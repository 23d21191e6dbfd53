use std::path::Path;

use async_trait::async_trait;
use rand::RngCore;

use super::{AbortSignal, BatchView, LoadProgress, Token};
use crate::config::ModelOptions;
use crate::error::BackendError;
use crate::sampling::Candidates;
use crate::slot::SlotId;

/// # Sampler
///
/// The numeric sampling primitives of a native backend.
///
/// The engine never computes probabilities itself; it decides *which* of
/// these primitives run and in what order (see [`sample`](crate::sampling::sample))
/// and hands each one the prompt's candidate array. Stochastic primitives
/// draw from the generator owned by the sequence being sampled, so a seeded
/// prompt samples the same way no matter what shares its batch.
///
/// Truncation primitives must leave at least `min_keep` candidates.
pub trait Sampler {
    /// Repetition, frequency and presence penalties over `last_tokens`.
    fn apply_penalties(
        &mut self,
        candidates: &mut Candidates,
        last_tokens: &[Token],
        penalty_repeat: f32,
        penalty_freq: f32,
        penalty_present: f32,
    );

    /// Sorts by descending logit and fills in normalized probabilities.
    fn softmax(&mut self, candidates: &mut Candidates);

    /// Highest raw logit, without normalization.
    fn greedy(&mut self, candidates: &mut Candidates) -> Token;

    fn top_k(&mut self, candidates: &mut Candidates, k: i32, min_keep: usize);

    fn tail_free(&mut self, candidates: &mut Candidates, z: f32, min_keep: usize);

    fn typical(&mut self, candidates: &mut Candidates, p: f32, min_keep: usize);

    fn top_p(&mut self, candidates: &mut Candidates, p: f32, min_keep: usize);

    fn min_p(&mut self, candidates: &mut Candidates, p: f32, min_keep: usize);

    fn temperature(&mut self, candidates: &mut Candidates, temperature: f32);

    /// Weighted draw from the remaining candidates.
    fn sample(&mut self, candidates: &mut Candidates, rng: &mut dyn RngCore) -> Token;

    /// Mirostat v1; updates `mu` in place.
    fn mirostat(
        &mut self,
        candidates: &mut Candidates,
        tau: f32,
        eta: f32,
        m: usize,
        mu: &mut f32,
        rng: &mut dyn RngCore,
    ) -> Token;

    /// Mirostat v2; updates `mu` in place.
    fn mirostat_v2(
        &mut self,
        candidates: &mut Candidates,
        tau: f32,
        eta: f32,
        mu: &mut f32,
        rng: &mut dyn RngCore,
    ) -> Token;
}

/// # InferenceBackend
///
/// A loaded model plus its single compute context.
///
/// The engine's worker is the only caller for the backend's whole lifetime,
/// so implementations need not be `Sync`. Every sequence is identified to the
/// backend by its [`SlotId`], which is what keeps key/value cache entries of
/// concurrently generated prompts apart.
///
/// ## Decode contract
///
/// [`decode`](Self::decode) evaluates one [`BatchView`]. Afterwards
/// [`logits`](Self::logits) returns a row for every view-local index whose
/// logits flag was set, until the next call to `decode`. A failed decode
/// leaves the key/value cache unspecified; the engine responds by failing
/// every active sequence and calling [`clear_cache`](Self::clear_cache).
#[async_trait]
pub trait InferenceBackend: Sampler + Send + 'static {
    /// Token capacity of the context, per sequence.
    fn context_length(&self) -> usize;

    fn tokenize(&self, text: &str, add_bos: bool, special: bool) -> Result<Vec<Token>, BackendError>;

    /// Raw bytes of one token. May be part of a multi-byte character.
    fn token_to_bytes(&self, token: Token) -> Vec<u8>;

    fn is_end_of_generation(&self, token: Token) -> bool;

    async fn decode(&mut self, batch: BatchView<'_>, abort: &AbortSignal) -> Result<(), BackendError>;

    /// Logits row for a view-local index of the last decoded batch.
    fn logits(&self, index: usize) -> Option<&[f32]>;

    /// Drops every key/value cache entry belonging to `slot`.
    fn remove_sequence(&mut self, slot: SlotId);

    /// Drops the whole key/value cache.
    fn clear_cache(&mut self);
}

/// # ModelLoader
///
/// Produces a ready [`InferenceBackend`] from a resolved model path.
///
/// Loading runs on the caller's thread. Implementations report progress
/// through `progress` and return [`BackendError::Aborted`] when
/// [`LoadProgress::report`] returns `false`.
pub trait ModelLoader {
    type Backend: InferenceBackend;

    fn load(
        &self,
        path: &Path,
        options: &ModelOptions,
        progress: &mut LoadProgress<'_>,
    ) -> Result<Self::Backend, BackendError>;
}
