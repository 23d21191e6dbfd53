use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::scheduler::{Scheduler, Shared};
use super::worker::WorkerHandle;
use crate::backend::{LoadProgress, ModelLoader};
use crate::config::{EngineConfig, ModelOptions};
use crate::error::EngineError;
use crate::prompt::{self, FinishReason, PromptHandle, PromptRequest};
use crate::sampling::SamplingOptions;
use crate::slot::SlotId;

/// # Engine
///
/// Continuous-batching text generation over a single loaded model.
///
/// An engine owns a pool of `max_parallel` slots and, once a model is
/// loaded, one background worker that is the only caller into the backend.
/// Submitted prompts wait in a FIFO queue until a slot frees up; from then on
/// they are decoded together with every other active prompt, one token per
/// prompt per batch round-trip, and leave the batch as soon as they stop.
///
/// ## Lifecycle
///
/// 1. [`Engine::new`] sizes the slot pool.
/// 2. [`Engine::load_model`] loads weights and spawns the worker. It must be
///    called from within a Tokio runtime, and only once.
/// 3. [`Engine::submit`] enqueues prompts and returns immediately.
/// 4. [`Engine::shutdown`] (or dropping the engine) stops the worker; every
///    prompt still queued or generating ends with `Err(Cancelled)`.
///
/// ## Example
///
/// ```ignore
/// let mut engine = Engine::new(EngineConfig::new(4, 512));
/// engine.load_model(&loader, "model.gguf", ModelOptions::default(), None)?;
///
/// let mut handle = engine.submit("Once upon a time", SamplingOptions::default(), true, false)?;
/// while let Some(chunk) = handle.next().await {
///     stdout.write_all(&chunk?)?;
/// }
/// ```
pub struct Engine {
    config: EngineConfig,
    shared: Arc<Shared>,
    worker: Option<WorkerHandle>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let config = EngineConfig::new(config.max_parallel, config.batch_size);
        Self {
            shared: Arc::new(Shared::new(config.max_parallel)),
            config,
            worker: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.worker.is_some()
    }

    /// Loads a model through `loader` and starts the generation worker.
    ///
    /// `progress` receives load percentages; returning `false` from it aborts
    /// the load. Once a model is loaded, further calls fail with
    /// [`EngineError::AlreadyLoaded`]; a failed load can be retried.
    pub fn load_model<L>(
        &mut self,
        loader: &L,
        path: impl AsRef<Path>,
        options: ModelOptions,
        progress: Option<&mut dyn FnMut(f32) -> bool>,
    ) -> Result<(), EngineError>
    where
        L: ModelLoader,
    {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyLoaded);
        }

        let path = path.as_ref();
        debug!(path = %path.display(), ?options, "loading model");
        let mut progress = LoadProgress::new(progress);
        let backend = loader
            .load(path, &options, &mut progress)
            .map_err(EngineError::Load)?;
        info!(path = %path.display(), "model loaded");

        let scheduler = Scheduler::new(backend, self.shared.clone(), self.config.batch_size);
        self.worker = Some(WorkerHandle::new(move |running, notifier| {
            tokio::spawn(scheduler.run(running, notifier))
        }));
        Ok(())
    }

    /// Enqueues a prompt and returns its handle without waiting for a slot.
    pub fn submit(
        &self,
        text: impl Into<String>,
        options: SamplingOptions,
        prepend_bos: bool,
        process_special_tokens: bool,
    ) -> Result<PromptHandle, EngineError> {
        self.submit_request(PromptRequest {
            text: text.into(),
            options,
            prepend_bos,
            process_special_tokens,
        })
    }

    pub fn submit_request(&self, request: PromptRequest) -> Result<PromptHandle, EngineError> {
        let worker = self.worker.as_ref().ok_or(EngineError::NotLoaded)?;
        let (queued, handle) = prompt::channel(request);

        {
            // The running check happens under the queue lock so a prompt can
            // never land in the queue after the worker's final drain.
            let mut pending = self.shared.pending.lock();
            if worker.is_running() {
                pending.push_back(queued);
            } else {
                drop(pending);
                queued.finish(FinishReason::Cancelled);
                return Ok(handle);
            }
        }

        worker.notify();
        Ok(handle)
    }

    /// Stops the worker. Idempotent; returns without waiting (see [`join`](Self::join)).
    pub fn shutdown(&self) {
        if let Some(worker) = &self.worker {
            if worker.is_running() {
                info!("shutting down engine");
            }
            worker.shutdown();
        }
    }

    /// Waits for the worker to exit after [`shutdown`](Self::shutdown).
    pub async fn join(&self) {
        if let Some(worker) = &self.worker {
            worker.join().await;
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.shared.slots.has_free_slot()
    }

    pub fn free_slots(&self) -> usize {
        self.shared.slots.free_count()
    }

    /// Prompts currently bound to a slot.
    pub fn active_count(&self) -> usize {
        self.shared.slots.occupied_count()
    }

    /// Prompts waiting for a slot.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Ids of the prompts bound to each occupied slot, in slot order.
    pub fn active_prompts(&self) -> Vec<(SlotId, Uuid)> {
        self.shared.slots.snapshot()
    }
}
