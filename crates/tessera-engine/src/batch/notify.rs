use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Zero-payload "something changed, render again" callback.
pub type InvalidateHandler = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct InvalidateHandlers {
    handlers: Vec<InvalidateHandler>,
}

impl InvalidateHandlers {
    pub fn push(&mut self, handler: InvalidateHandler) {
        self.handlers.push(handler);
    }

    pub fn raise(&self) {
        for handler in &self.handlers {
            handler();
        }
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

/// Pending-redraw flag for a frame scheduler.
///
/// Any number of invalidations between two frames collapse into a single
/// pending redraw. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct RedrawRequest {
    pending: Arc<AtomicBool>,
}

impl RedrawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler to pass to [`GeometryBatch::subscribe`](super::GeometryBatch::subscribe).
    pub fn handler(&self) -> impl Fn() + Send + Sync + 'static {
        let pending = Arc::clone(&self.pending);
        move || pending.store(true, Ordering::Release)
    }

    pub fn request(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether a redraw was pending.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}
