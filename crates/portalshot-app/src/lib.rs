//! portalshot: select a region, window or output, then save a screenshot or
//! watch it live.

pub mod orchestrator;
pub mod screenshot;
pub mod state;
pub mod window;

pub use orchestrator::{
    inbox, CaptureState, Inbox, Input, Notice, Orchestrator, OrchestratorHandle, RecordingPhase,
};
pub use screenshot::ScreenshotSaver;
pub use state::{GuiState, SharedState};
pub use window::exclude_surface;
