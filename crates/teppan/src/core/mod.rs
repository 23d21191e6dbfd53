//! # Engine Core
//!
//! The continuous-batching machinery behind [`Engine`].
//!
//! ## Module Structure
//!
//! * `engine` - The public facade: model loading, submission, shutdown and
//!   introspection.
//!
//! * `scheduler` - The worker loop. Each iteration admits queued prompts into
//!   free slots, assembles one batch from every active sequence, decodes it in
//!   chunks, samples one token per sequence and evicts sequences that stopped.
//!
//! * `sequence` - Per-slot generation state: token buffer, cursors, stop set,
//!   mirostat state and random generator.
//!
//! * `worker` - Spawning, waking and stopping the background task.
//!
mod engine;
mod scheduler;
mod sequence;
mod worker;

pub use engine::Engine;
