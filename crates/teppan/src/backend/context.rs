use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Abort context handed to every [`decode`](super::InferenceBackend::decode) call.
///
/// Backends that can interrupt a long native decode poll
/// [`is_aborted`](Self::is_aborted) and return
/// [`BackendError::Aborted`](crate::error::BackendError::Aborted).
#[derive(Debug, Clone)]
pub struct AbortSignal {
    running: Arc<AtomicBool>,
}

impl AbortSignal {
    pub(crate) fn new(running: Arc<AtomicBool>) -> Self {
        Self { running }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::new(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_aborted(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

/// Progress context passed to [`ModelLoader::load`](super::ModelLoader::load).
///
/// Wraps the caller's optional callback for the duration of one load and is
/// dropped with it.
pub struct LoadProgress<'a> {
    callback: Option<&'a mut dyn FnMut(f32) -> bool>,
    last: f32,
}

impl<'a> LoadProgress<'a> {
    pub fn new(callback: Option<&'a mut dyn FnMut(f32) -> bool>) -> Self {
        Self { callback, last: 0.0 }
    }

    /// A context that reports nowhere.
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Reports `percent` (clamped to `0..=100`) and returns whether loading
    /// should continue.
    pub fn report(&mut self, percent: f32) -> bool {
        let percent = percent.clamp(0.0, 100.0);
        self.last = percent;
        match self.callback.as_deref_mut() {
            Some(callback) => callback(percent),
            None => true,
        }
    }

    /// The last value passed to [`report`](Self::report).
    pub fn last(&self) -> f32 {
        self.last
    }
}
