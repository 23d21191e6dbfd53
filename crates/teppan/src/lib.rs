//! # Teppan
//!
//! A **continuous-batching** generation engine that multiplexes many
//! concurrent text-generation requests onto a single native model context.
//!
//! ## Overview
//!
//! Rather than running one prompt at a time, teppan keeps a fixed number of
//! slots. Every active prompt occupies one slot, and each step of the engine
//! decodes one shared batch containing the unconsumed tokens of every active
//! prompt. Prompts join the batch as soon as a slot frees up and leave it the
//! moment they stop, so throughput stays high without any prompt waiting for
//! the rest of its batch to finish.
//!
//! Key components include:
//!
//! - A fixed-capacity slot pool bounding concurrency
//! - A single background worker that owns the backend and drives the
//!   admit / assemble / decode / sample / evict loop
//! - A sampling pipeline dispatching to the backend's numeric primitives
//! - Per-prompt asynchronous streams of generated token bytes
//!
//! ## Architecture
//!
//! ### Backend Traits
//!
//! [`InferenceBackend`](backend::InferenceBackend) and
//! [`Sampler`](backend::Sampler) describe the native library the engine
//! drives: batched decode, logits access, tokenization, key/value cache
//! purging and sampling primitives. [`ModelLoader`](backend::ModelLoader)
//! produces a backend from a model path. The engine stays independent of
//! any particular native library.
//!
//! ### Prompts
//!
//! [`Engine::submit`] returns a [`PromptHandle`], a `futures::Stream` of
//! `Result<Vec<u8>, GenerationError>`. Each chunk holds the raw bytes of one
//! token. The stream ends with `None` when generation stops normally, or
//! with a final `Err(Cancelled)` / `Err(BackendDecodeFailure(_))`.
//! [`PromptHandle::finish_reason`] tells the normal stops apart.
//!
//! ### Sampling
//!
//! [`SamplingOptions`] select exactly one strategy: softmax-argmax for a
//! negative temperature, greedy for zero, mirostat v1/v2 when enabled, and
//! otherwise the top-k, tail-free, typical, top-p, min-p, temperature chain
//! followed by a weighted draw.
//!
//! ## Features
//!
//! - **serde** (default) - `Serialize`/`Deserialize` for configuration and
//!   sampling options
//!
//! ## Implementation Details
//!
//! The worker is a Tokio task and the only caller into the backend. It parks
//! on a notifier when there is nothing to decode. Only the slot pool and the
//! pending queue are shared behind a lock; everything else crosses threads
//! through atomics, write-once cells and one single-producer channel per
//! prompt.
//!

pub mod backend;
pub mod config;
pub mod error;
pub mod prompt;
pub mod sampling;
pub mod slot;

mod core;

pub use crate::core::Engine;
pub use config::{EngineConfig, ModelOptions};
pub use error::{BackendError, EngineError, GenerationError, SlotError};
pub use prompt::{CancelHandle, FinishReason, PromptHandle, PromptMetrics, PromptRequest};
pub use sampling::{Mirostat, SamplingOptions};
