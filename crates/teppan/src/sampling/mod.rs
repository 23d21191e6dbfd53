//! # Sampling
//!
//! Per-prompt sampling configuration and the policy dispatch that turns one
//! row of logits into one token by driving the backend's [`Sampler`]
//! primitives.
//!
//! [`Sampler`]: crate::backend::Sampler

mod candidates;
mod options;
mod pipeline;

pub use candidates::{Candidates, TokenData};
pub use options::{Mirostat, SamplingOptions};
pub use pipeline::{MirostatState, Strategy, sample};
