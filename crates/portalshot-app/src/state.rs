use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use portalshot_core::{CaptureMode, CaptureRegion};

use crate::orchestrator::{CaptureState, Notice, RecordingPhase};

// ── Phase ──────────────────────────────────────────────────────────────────────

/// Toolbar status colour for a capture state.
pub fn state_color(state: &CaptureState) -> egui::Color32 {
    match state {
        CaptureState::Idle                                => egui::Color32::from_rgb(160, 160, 160),
        CaptureState::Selecting                           => egui::Color32::from_rgb(230, 185, 50),
        CaptureState::Recording(RecordingPhase::Starting) => egui::Color32::from_rgb(50, 180, 230),
        CaptureState::Recording(RecordingPhase::Live)     => egui::Color32::from_rgb(220, 60, 60),
        CaptureState::Recording(RecordingPhase::Stopped)  => egui::Color32::from_rgb(160, 160, 160),
        CaptureState::ScreenshotPending                   => egui::Color32::from_rgb(50, 180, 230),
        CaptureState::Saved(_)                            => egui::Color32::from_rgb(60, 200, 80),
        CaptureState::Failed(_)                           => egui::Color32::from_rgb(220, 60, 60),
    }
}

// ── GuiState ──────────────────────────────────────────────────────────────────

pub struct GuiState {
    pub state:       CaptureState,
    pub mode:        CaptureMode,
    pub region:      Option<CaptureRegion>,
    /// Set while a session is attached to the preview.
    pub live:        bool,
    pub last_saved:  Option<PathBuf>,
    pub last_error:  Option<String>,
    pub logs:        VecDeque<String>,
}

impl Default for GuiState {
    fn default() -> Self {
        Self {
            state:      CaptureState::Idle,
            mode:       CaptureMode::Screenshot,
            region:     None,
            live:       false,
            last_saved: None,
            last_error: None,
            logs:       VecDeque::new(),
        }
    }
}

impl GuiState {
    /// Append a line to the circular log buffer (max 300 entries).
    pub fn push_log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("[GUI log] {}", line);
        if self.logs.len() >= 300 {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    /// Folds an orchestrator notice into the toolbar state.
    pub fn apply(&mut self, notice: &Notice) {
        match notice {
            Notice::State(state) => {
                if *state == CaptureState::Selecting {
                    self.last_error = None;
                }
                self.state = state.clone();
            }
            Notice::Mode(mode) => self.mode = *mode,
            Notice::RegionChanged(region) => self.region = Some(*region),
            Notice::AttachSession(_) => self.live = true,
            Notice::DetachSession => self.live = false,
            Notice::RecordingStarted => self.push_log("Recording started"),
            Notice::ScreenshotSaved(path) => {
                self.push_log(format!("Saved {}", path.display()));
                self.last_saved = Some(path.clone());
            }
            Notice::Error(e) => {
                self.push_log(format!("[ERROR] {e}"));
                self.last_error = Some(e.clone());
            }
        }
    }
}

/// Shared handle passed between the GUI thread and the capture runtime thread.
pub type SharedState = Arc<Mutex<GuiState>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_update_toolbar_state() {
        let mut gui = GuiState::default();
        gui.apply(&Notice::Mode(CaptureMode::Record));
        gui.apply(&Notice::RegionChanged(CaptureRegion::new(1, 2, 3, 4)));
        gui.apply(&Notice::Error("boom".into()));
        gui.apply(&Notice::State(CaptureState::Failed("boom".into())));

        assert_eq!(gui.mode, CaptureMode::Record);
        assert_eq!(gui.region, Some(CaptureRegion::new(1, 2, 3, 4)));
        assert_eq!(gui.last_error.as_deref(), Some("boom"));
        assert_eq!(gui.logs.back().map(String::as_str), Some("[ERROR] boom"));

        gui.apply(&Notice::State(CaptureState::Selecting));
        assert_eq!(gui.last_error, None);
    }

    #[test]
    fn log_buffer_is_bounded() {
        let mut gui = GuiState::default();
        for i in 0..310 {
            gui.push_log(format!("line {i}"));
        }
        assert_eq!(gui.logs.len(), 300);
        assert_eq!(gui.logs.front().map(String::as_str), Some("line 10"));
    }
}
