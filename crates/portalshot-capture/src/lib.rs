//! portalshot-capture: interface to the screen-capture subsystem.
//!
//! The subsystem owns the selection UI and the shared video buffers; this crate
//! describes it as three traits plus the notification primitives they use.
//!
//! | Object | Role |
//! |--------|------|
//! | [`CaptureManager`] | process-wide entry point, activity + selection-finished signals |
//! | [`CaptureContext`] | one selection: region, live session, still frame |
//! | [`CaptureSession`] | live stream of [`BufferDescriptor`]s |
//!
//! # Backends
//!
//! | Backend | Feature | Transport |
//! |---------|---------|-----------|
//! | xdg-desktop-portal ScreenCast (ashpd + GStreamer `pipewiresrc`) | `portal` | dma-buf frames, shared memory fallback |
//!
//! ```text
//! CaptureManager ──ensure_context──► CaptureContext ──ensure_session──► CaptureSession
//!       │                                 │                                  │
//!  selection_finished              region_changed                      frame_ready
//!                                  ensure_frame ──► PendingFrame       acquire_buffer
//! ```

use std::sync::Arc;

pub use portalshot_core::{
    BufferDescriptor, CaptureError, CaptureRegion, SourceKinds, SourceSelection, SurfaceHandle,
};

pub mod frame;
pub mod notifier;
#[cfg(feature = "portal")]
pub mod portal;

pub use frame::{frame_channel, FrameOutcome, FrameSender, PendingFrame, SharedFrameSender};
pub use notifier::{Notifier, Subscription};

// ── Subsystem interface ──────────────────────────────────────────────────────

pub trait CaptureManager: Send + Sync {
    /// Whether the subsystem is ready to start a selection.
    fn is_active(&self) -> bool;
    fn on_active_changed(&self) -> &Notifier<bool>;
    /// Fired when the user completes a selection.
    fn on_selection_finished(&self) -> &Notifier<()>;
    /// Returns the current context, creating it if needed.
    fn ensure_context(&self) -> Result<Arc<dyn CaptureContext>, CaptureError>;
    /// Asks the selection UI to complete the current selection.
    fn finish_select(&self);
}

pub trait CaptureContext: Send + Sync {
    fn select_source(&self, selection: &SourceSelection) -> Result<(), CaptureError>;
    fn capture_region(&self) -> CaptureRegion;
    fn on_region_changed(&self) -> &Notifier<CaptureRegion>;
    fn on_destroyed(&self) -> &Notifier<()>;
    /// Returns the live session for the selected source, creating it if needed.
    fn ensure_session(&self) -> Result<Arc<dyn CaptureSession>, CaptureError>;
    /// Requests one frame of the selected source.
    fn ensure_frame(&self) -> Result<PendingFrame, CaptureError>;
}

pub trait CaptureSession: Send + Sync {
    fn start(&self) -> Result<(), CaptureError>;
    fn started(&self) -> bool;
    /// Takes the most recent buffer, if one arrived since the last call.
    fn acquire_buffer(&self) -> Option<BufferDescriptor>;
    fn on_frame_ready(&self) -> &Notifier<()>;
    fn on_destroyed(&self) -> &Notifier<()>;
}

// ── Backend selection ────────────────────────────────────────────────────────

/// Opens the compiled-in backend. Must be called from inside a tokio runtime.
pub fn open_default(
    config: &portalshot_core::CaptureConfig,
) -> Result<Arc<dyn CaptureManager>, CaptureError> {
    #[cfg(feature = "portal")]
    {
        let manager: Arc<dyn CaptureManager> = portal::PortalManager::connect(config.import_path);
        Ok(manager)
    }
    #[cfg(not(feature = "portal"))]
    {
        let _ = config;
        tracing::warn!("open_default: built without a capture backend");
        Err(CaptureError::unavailable(
            "no capture backend compiled in; enable the `portal` feature",
        ))
    }
}
