//! Capture orchestration.
//!
//! ```text
//! Idle ──active──► Selecting ──finished(Record)──► Recording(Starting) ──settle──► Recording(Live)
//!                      │                                   │                            │
//!                      │                                   └──────── destroyed ─────────┴──► Recording(Stopped)
//!                      └──finished(Screenshot)──► ScreenshotPending ──► Saved | Failed
//! ```
//!
//! A screenshot that produces no frame within `frame_timeout_ms` fails, as does
//! one whose context is destroyed while it is pending.
//!
//! Every external notification is forwarded into one input channel and handled
//! in order by [`Orchestrator::step`]. Listener registrations made for a
//! selection cycle are replaced when the next cycle begins, and inputs tagged
//! with an older cycle are ignored.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use portalshot_capture::{
    CaptureContext, CaptureManager, CaptureSession, FrameOutcome, SourceSelection, Subscription,
};
use portalshot_core::{CaptureConfig, CaptureError, CaptureMode, CaptureRegion, SurfaceHandle};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::screenshot::ScreenshotSaver;

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingPhase {
    /// Session started, waiting for the settle delay.
    Starting,
    Live,
    /// Session or context destroyed; the surface is detached.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Selecting,
    Recording(RecordingPhase),
    ScreenshotPending,
    Saved(PathBuf),
    Failed(String),
}

impl CaptureState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Waiting for capture service",
            Self::Selecting => "Select a region, window or output",
            Self::Recording(RecordingPhase::Starting) => "Starting recording…",
            Self::Recording(RecordingPhase::Live) => "Recording",
            Self::Recording(RecordingPhase::Stopped) => "Recording stopped",
            Self::ScreenshotPending => "Capturing…",
            Self::Saved(_) => "Screenshot saved",
            Self::Failed(_) => "Error",
        }
    }

    /// Whether a new selection may be started from here.
    pub fn can_restart(&self) -> bool {
        !matches!(self, Self::Selecting | Self::ScreenshotPending)
    }
}

// ── Inputs / notices ─────────────────────────────────────────────────────────

/// Everything the orchestrator reacts to.
pub enum Input {
    ActiveChanged(bool),
    SetMode(CaptureMode),
    /// Toolbar asks the selection UI to complete.
    FinishSelection,
    /// Start a new selection cycle.
    Restart,
    SelectionFinished { cycle: u64 },
    RegionChanged { cycle: u64, region: CaptureRegion },
    ContextDestroyed { cycle: u64 },
    SessionDestroyed { cycle: u64 },
    SettleElapsed { cycle: u64 },
    ScreenshotDone { cycle: u64, result: Result<PathBuf, CaptureError> },
    Shutdown,
}

/// What the UI is told.
#[derive(Clone)]
pub enum Notice {
    State(CaptureState),
    Mode(CaptureMode),
    RegionChanged(CaptureRegion),
    AttachSession(Arc<dyn CaptureSession>),
    DetachSession,
    RecordingStarted,
    ScreenshotSaved(PathBuf),
    Error(String),
}

impl fmt::Debug for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(s) => f.debug_tuple("State").field(s).finish(),
            Self::Mode(m) => f.debug_tuple("Mode").field(m).finish(),
            Self::RegionChanged(r) => f.debug_tuple("RegionChanged").field(r).finish(),
            Self::AttachSession(_) => f.write_str("AttachSession"),
            Self::DetachSession => f.write_str("DetachSession"),
            Self::RecordingStarted => f.write_str("RecordingStarted"),
            Self::ScreenshotSaved(p) => f.debug_tuple("ScreenshotSaved").field(p).finish(),
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

/// Creates the input channel. The handle goes to the toolbar, the inbox to
/// [`Orchestrator::new`].
pub fn inbox() -> (OrchestratorHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OrchestratorHandle { tx: tx.clone() }, Inbox { tx, rx })
}

pub struct Inbox {
    tx: mpsc::UnboundedSender<Input>,
    rx: mpsc::UnboundedReceiver<Input>,
}

/// Toolbar commands.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl OrchestratorHandle {
    pub fn set_mode(&self, mode: CaptureMode) {
        self.send(Input::SetMode(mode));
    }

    pub fn finish_selection(&self) {
        self.send(Input::FinishSelection);
    }

    pub fn restart(&self) {
        self.send(Input::Restart);
    }

    pub fn shutdown(&self) {
        self.send(Input::Shutdown);
    }

    fn send(&self, input: Input) {
        if self.tx.send(input).is_err() {
            debug!("Orchestrator gone; command dropped");
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

pub struct Orchestrator {
    manager: Arc<dyn CaptureManager>,
    config: CaptureConfig,
    saver: ScreenshotSaver,
    exclude_surface: Option<SurfaceHandle>,
    mode: CaptureMode,
    state: CaptureState,
    cycle: u64,
    context: Option<Arc<dyn CaptureContext>>,
    session: Option<Arc<dyn CaptureSession>>,
    manager_subs: Vec<Subscription>,
    cycle_subs: Vec<Subscription>,
    session_subs: Vec<Subscription>,
    /// Waits for the pending screenshot frame and saves it.
    screenshot_task: Option<tokio::task::JoinHandle<()>>,
    tx: mpsc::UnboundedSender<Input>,
    rx: mpsc::UnboundedReceiver<Input>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Orchestrator {
    pub fn new(
        manager: Arc<dyn CaptureManager>,
        config: CaptureConfig,
        inbox: Inbox,
        notices: mpsc::UnboundedSender<Notice>,
        exclude_surface: Option<SurfaceHandle>,
    ) -> Self {
        let mode = if config.start_in_record_mode { CaptureMode::Record } else { CaptureMode::Screenshot };
        Self {
            manager,
            saver: ScreenshotSaver::from_config(&config),
            config,
            exclude_surface,
            mode,
            state: CaptureState::Idle,
            cycle: 0,
            context: None,
            session: None,
            manager_subs: Vec::new(),
            cycle_subs: Vec::new(),
            session_subs: Vec::new(),
            screenshot_task: None,
            tx: inbox.tx,
            rx: inbox.rx,
            notices,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Registers for activity changes and begins selecting if the subsystem
    /// is already active.
    pub fn start(&mut self) {
        let tx = self.tx.clone();
        self.manager_subs.push(self.manager.on_active_changed().subscribe(move |active| {
            let _ = tx.send(Input::ActiveChanged(*active));
        }));
        self.notify(Notice::Mode(self.mode));
        self.notify(Notice::State(self.state.clone()));
        if self.manager.is_active() {
            self.begin_selection();
        } else {
            info!("Capture subsystem not active yet; waiting");
        }
    }

    /// Handles one input. Returns `false` after `Shutdown`.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(input) => self.handle(input),
            None => false,
        }
    }

    pub async fn run(mut self) {
        self.start();
        while self.step().await {}
        info!("Orchestrator stopped");
    }

    fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::ActiveChanged(true) => {
                if self.state == CaptureState::Idle {
                    self.begin_selection();
                }
            }
            Input::ActiveChanged(false) => {
                warn!("Capture subsystem became inactive");
                self.cancel_screenshot();
                self.stop_recording();
                self.cycle_subs.clear();
                self.context = None;
                self.set_state(CaptureState::Idle);
            }
            Input::SetMode(mode) => {
                if mode != self.mode {
                    debug!("Mode set to {}", mode);
                    self.mode = mode;
                    self.notify(Notice::Mode(mode));
                }
            }
            Input::FinishSelection => {
                if self.state == CaptureState::Selecting {
                    self.manager.finish_select();
                } else {
                    debug!("finish ignored in state {:?}", self.state);
                }
            }
            Input::Restart => {
                if !self.state.can_restart() {
                    debug!("restart ignored in state {:?}", self.state);
                } else if !self.manager.is_active() {
                    self.set_state(CaptureState::Idle);
                } else {
                    self.stop_recording();
                    self.begin_selection();
                }
            }
            Input::SelectionFinished { cycle } => self.selection_finished(cycle),
            Input::RegionChanged { cycle, region } => {
                if cycle == self.cycle {
                    self.notify(Notice::RegionChanged(region));
                }
            }
            Input::ContextDestroyed { cycle } => {
                if cycle == self.cycle {
                    info!("Capture context destroyed");
                    self.context = None;
                    self.cycle_subs.clear();
                    match self.state {
                        CaptureState::Selecting => {
                            self.fail(CaptureError::unavailable("selection cancelled"));
                        }
                        CaptureState::ScreenshotPending => {
                            self.cancel_screenshot();
                            self.fail(CaptureError::unavailable("capture context destroyed"));
                        }
                        _ => self.stop_recording(),
                    }
                }
            }
            Input::SessionDestroyed { cycle } => {
                if cycle == self.cycle {
                    info!("Capture session destroyed");
                    self.stop_recording();
                }
            }
            Input::SettleElapsed { cycle } => {
                if cycle == self.cycle && self.state == CaptureState::Recording(RecordingPhase::Starting) {
                    info!("Recording started");
                    self.set_state(CaptureState::Recording(RecordingPhase::Live));
                    self.notify(Notice::RecordingStarted);
                }
            }
            Input::ScreenshotDone { cycle, result } => {
                if cycle != self.cycle || self.state != CaptureState::ScreenshotPending {
                    debug!("Stale screenshot result for cycle {cycle}");
                } else {
                    self.screenshot_task = None;
                    match result {
                        Ok(path) => {
                            self.notify(Notice::ScreenshotSaved(path.clone()));
                            self.set_state(CaptureState::Saved(path));
                        }
                        Err(e) => self.fail(e),
                    }
                }
            }
            Input::Shutdown => {
                self.cancel_screenshot();
                self.stop_recording();
                self.cycle_subs.clear();
                self.manager_subs.clear();
                return false;
            }
        }
        true
    }

    // MARK: - Selection

    fn begin_selection(&mut self) {
        self.cycle += 1;
        let cycle = self.cycle;
        // Drop the previous cycle's listeners before registering new ones.
        self.cycle_subs.clear();

        let context = match self.manager.ensure_context() {
            Ok(context) => context,
            Err(e) => return self.fail(e),
        };

        let tx = self.tx.clone();
        self.cycle_subs.push(self.manager.on_selection_finished().subscribe(move |_| {
            let _ = tx.send(Input::SelectionFinished { cycle });
        }));
        let tx = self.tx.clone();
        self.cycle_subs.push(context.on_region_changed().subscribe(move |region| {
            let _ = tx.send(Input::RegionChanged { cycle, region: *region });
        }));
        let tx = self.tx.clone();
        self.cycle_subs.push(context.on_destroyed().subscribe(move |_| {
            let _ = tx.send(Input::ContextDestroyed { cycle });
        }));

        let selection = SourceSelection::any_source(self.exclude_surface);
        if let Err(e) = context.select_source(&selection) {
            self.cycle_subs.clear();
            return self.fail(e);
        }
        self.context = Some(context);
        info!("Selection cycle {} started", cycle);
        self.set_state(CaptureState::Selecting);
    }

    fn selection_finished(&mut self, cycle: u64) {
        if cycle != self.cycle || self.state != CaptureState::Selecting {
            debug!("selection finished ignored (cycle {cycle}, state {:?})", self.state);
            return;
        }
        let Some(context) = self.context.clone() else {
            return self.fail(CaptureError::unavailable("no capture context"));
        };
        let region = context.capture_region();
        info!("Selection finished: {} in {} mode", region, self.mode);
        self.notify(Notice::RegionChanged(region));

        let result = match self.mode {
            CaptureMode::Record => self.start_recording(&context),
            CaptureMode::Screenshot => self.request_screenshot(&context),
        };
        if let Err(e) = result {
            self.fail(e);
        }
    }

    // MARK: - Recording

    fn start_recording(&mut self, context: &Arc<dyn CaptureContext>) -> Result<(), CaptureError> {
        let session = context.ensure_session()?;
        session.start()?;

        let cycle = self.cycle;
        let tx = self.tx.clone();
        self.session_subs.clear();
        self.session_subs.push(session.on_destroyed().subscribe(move |_| {
            let _ = tx.send(Input::SessionDestroyed { cycle });
        }));
        self.session = Some(Arc::clone(&session));
        self.notify(Notice::AttachSession(session));
        self.set_state(CaptureState::Recording(RecordingPhase::Starting));

        let tx = self.tx.clone();
        let delay = self.config.settle_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Input::SettleElapsed { cycle });
        });
        Ok(())
    }

    fn stop_recording(&mut self) {
        self.session_subs.clear();
        if self.session.take().is_some() {
            self.notify(Notice::DetachSession);
            if matches!(self.state, CaptureState::Recording(_)) {
                self.set_state(CaptureState::Recording(RecordingPhase::Stopped));
            }
        }
    }

    // MARK: - Screenshot

    fn request_screenshot(&mut self, context: &Arc<dyn CaptureContext>) -> Result<(), CaptureError> {
        let pending = context.ensure_frame()?;
        self.set_state(CaptureState::ScreenshotPending);

        let cycle = self.cycle;
        let tx = self.tx.clone();
        let saver = self.saver.clone();
        let timeout = self.config.frame_timeout();
        self.screenshot_task = Some(tokio::spawn(async move {
            // Timing out drops `pending`, which stops the producing pipeline.
            let result = match tokio::time::timeout(timeout, pending.wait()).await {
                Ok(FrameOutcome::Ready(image)) => tokio::task::spawn_blocking(move || saver.save(&image))
                    .await
                    .unwrap_or_else(|e| Err(CaptureError::save_failed(e.to_string()))),
                Ok(FrameOutcome::Failed) => Err(CaptureError::FrameFailed),
                Err(_) => {
                    warn!("No screenshot frame within {:?}", timeout);
                    Err(CaptureError::FrameFailed)
                }
            };
            let _ = tx.send(Input::ScreenshotDone { cycle, result });
        }));
        Ok(())
    }

    /// Drops the pending frame (stopping its producer) without saving.
    fn cancel_screenshot(&mut self) {
        if let Some(task) = self.screenshot_task.take() {
            debug!("Cancelling pending screenshot");
            task.abort();
        }
    }

    // MARK: - Helpers

    fn fail(&mut self, e: CaptureError) {
        error!("{}", e);
        let message = e.to_string();
        self.notify(Notice::Error(message.clone()));
        self.set_state(CaptureState::Failed(message));
    }

    fn set_state(&mut self, state: CaptureState) {
        if self.state != state {
            debug!("State {:?} -> {:?}", self.state, state);
            self.state = state;
            self.notify(Notice::State(self.state.clone()));
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_allowed_outside_pending_states() {
        assert!(CaptureState::Idle.can_restart());
        assert!(CaptureState::Failed("x".into()).can_restart());
        assert!(CaptureState::Recording(RecordingPhase::Live).can_restart());
        assert!(!CaptureState::Selecting.can_restart());
        assert!(!CaptureState::ScreenshotPending.can_restart());
    }

    #[test]
    fn handle_commands_reach_inbox() {
        let (handle, mut inbox) = inbox();
        handle.set_mode(CaptureMode::Record);
        handle.shutdown();
        assert!(matches!(inbox.rx.try_recv(), Ok(Input::SetMode(CaptureMode::Record))));
        assert!(matches!(inbox.rx.try_recv(), Ok(Input::Shutdown)));
    }
}
