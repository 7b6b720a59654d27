use portalshot_app::{CaptureState, Inbox, Notice, Orchestrator, SharedState};
use portalshot_core::{CaptureConfig, SurfaceHandle};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::preview::{SharedPreview, SurfaceOp};

// ── Entry point (called from the capture runtime thread) ─────────────────────

/// Opens the capture subsystem and drives the orchestrator until the window
/// closes. A subsystem that cannot be opened is reported in the toolbar and
/// the window stays up.
pub async fn run(
    config: CaptureConfig,
    inbox: Inbox,
    state: SharedState,
    preview: SharedPreview,
    ctx: egui::Context,
    exclude_surface: Option<SurfaceHandle>,
) {
    let manager = match portalshot_capture::open_default(&config) {
        Ok(m) => m,
        Err(e) => {
            error!("Capture subsystem unavailable: {e}");
            let mut s = state.lock().unwrap();
            s.apply(&Notice::Error(e.to_string()));
            s.state = CaptureState::Failed(e.to_string());
            ctx.request_repaint();
            return;
        }
    };
    state.lock().unwrap().push_log("Capture subsystem opened");

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(manager, config, inbox, notice_tx, exclude_surface);

    // ── Notice forwarder ──────────────────────────────────────────────────
    let forwarder = tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            match &notice {
                Notice::AttachSession(session) => {
                    preview.lock().unwrap().queue(SurfaceOp::Attach(session.clone()));
                }
                Notice::DetachSession => preview.lock().unwrap().queue(SurfaceOp::Detach),
                Notice::RegionChanged(region) => {
                    preview.lock().unwrap().queue(SurfaceOp::Resize(*region));
                }
                _ => {}
            }
            state.lock().unwrap().apply(&notice);
            ctx.request_repaint();
        }
    });

    orchestrator.run().await;
    // The orchestrator owned the only sender; the forwarder drains and ends.
    let _ = forwarder.await;
    info!("Capture thread finished");
}
