//! Single-shot rendezvous for a still capture.

use std::any::Any;
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use tokio::sync::oneshot;

/// Result of a single-frame capture.
#[derive(Debug)]
pub enum FrameOutcome {
    Ready(RgbaImage),
    Failed,
}

/// Creates a connected producer/consumer pair.
pub fn frame_channel() -> (FrameSender, PendingFrame) {
    let (tx, rx) = oneshot::channel();
    (FrameSender { tx }, PendingFrame { rx, keepalive: None })
}

/// Producer side, held by the backend. Consumed by the first outcome.
#[derive(Debug)]
pub struct FrameSender {
    tx: oneshot::Sender<FrameOutcome>,
}

impl FrameSender {
    pub fn ready(self, image: RgbaImage) {
        let _ = self.tx.send(FrameOutcome::Ready(image));
    }

    pub fn failed(self) {
        let _ = self.tx.send(FrameOutcome::Failed);
    }

    /// Wraps the sender so several producers (sample callback, bus watch) can
    /// race to answer; the first one wins.
    pub fn shared(self) -> SharedFrameSender {
        SharedFrameSender(Arc::new(Mutex::new(Some(self))))
    }
}

/// Clonable [`FrameSender`]. Returns whether this call delivered the outcome.
#[derive(Debug, Clone)]
pub struct SharedFrameSender(Arc<Mutex<Option<FrameSender>>>);

impl SharedFrameSender {
    fn take(&self) -> Option<FrameSender> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
    }

    pub fn is_answered(&self) -> bool {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).is_none()
    }

    pub fn ready(&self, image: RgbaImage) -> bool {
        self.take().map(|tx| tx.ready(image)).is_some()
    }

    pub fn failed(&self) -> bool {
        self.take().map(FrameSender::failed).is_some()
    }
}

/// Consumer side returned by `CaptureContext::ensure_frame`.
pub struct PendingFrame {
    rx: oneshot::Receiver<FrameOutcome>,
    keepalive: Option<Box<dyn Any + Send>>,
}

impl PendingFrame {
    /// Keeps `value` (typically the producing pipeline) alive until the
    /// outcome has been received.
    pub fn with_keepalive(mut self, value: impl Any + Send) -> Self {
        self.keepalive = Some(Box::new(value));
        self
    }

    /// Resolves to [`FrameOutcome::Failed`] if the producer goes away without
    /// answering.
    pub async fn wait(self) -> FrameOutcome {
        let PendingFrame { rx, keepalive } = self;
        let outcome = rx.await.unwrap_or(FrameOutcome::Failed);
        drop(keepalive);
        outcome
    }
}

impl std::fmt::Debug for PendingFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFrame").field("keepalive", &self.keepalive.is_some()).finish()
    }
}
