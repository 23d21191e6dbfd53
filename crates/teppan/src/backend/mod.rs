//! # Inference Backend
//!
//! This module describes the native backend the engine drives, in a
//! backend-agnostic manner. The engine only needs:
//!
//! - a batched `decode` returning logits per requested position,
//! - the sampling primitives ([`Sampler`]),
//! - tokenization, detokenization and end-of-generation detection,
//! - per-sequence and whole-cache key/value purging.
//!
//! Batches cross the boundary as bounds-checked [`BatchView`] slices of an
//! owned [`Batch`], and per-call context (abort signal, load progress) is
//! passed explicitly rather than through global state.

mod batch;
mod context;
mod core_trait;

#[cfg(test)]
/// Scripted byte-level backend.
///
/// Operates on a 258-token vocabulary of raw bytes plus BOS/EOS
pub(crate) mod mock;

pub use batch::{Batch, BatchView};
pub use context::{AbortSignal, LoadProgress};
pub use core_trait::*;

/// Vocabulary id of one token.
pub type Token = u32;
