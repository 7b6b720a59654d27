mod gui_app;
mod preview;
mod runner;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use portalshot_app::{inbox, GuiState, SharedState};
use raw_window_handle::HasWindowHandle;
use portalshot_core::CaptureConfig;
use tracing::{info, warn};

use preview::{Preview, SharedPreview};

fn main() -> eframe::Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────
    // RUST_LOG=debug for more detail, GST_DEBUG=3 for the capture pipeline
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    info!("portalshot v{}", env!("CARGO_PKG_VERSION"));

    // ── Config ────────────────────────────────────────────────────────────
    let config = CaptureConfig::load()
        .context("Failed to load config")
        .unwrap_or_else(|e| {
            warn!("{e:#}; using defaults");
            CaptureConfig::default()
        });

    // ── Shared state ──────────────────────────────────────────────────────
    let shared_state: SharedState = Arc::new(Mutex::new(GuiState::default()));
    let (handle, inbox) = inbox();

    // ── Window options ────────────────────────────────────────────────────
    let window_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("portalshot")
            .with_inner_size([640.0, 480.0])
            .with_min_inner_size([420.0, gui_app::TOOLBAR_HEIGHT]),
        ..Default::default()
    };

    eframe::run_native(
        "portalshot",
        window_options,
        Box::new(move |cc| {
            let preview: SharedPreview =
                Arc::new(Mutex::new(Preview::new(&config, cc.egui_ctx.clone())));

            let state_bg   = Arc::clone(&shared_state);
            let preview_bg = Arc::clone(&preview);
            let ctx_bg     = cc.egui_ctx.clone();

            // Keep our own toolbar out of the selection.
            let exclude = cc
                .window_handle()
                .ok()
                .and_then(|h| portalshot_app::exclude_surface(h.as_raw()));
            info!("Excluding surface {:?} from selection", exclude);

            // The orchestrator is single-threaded; it gets its own OS thread
            // so capture events never wait on the egui/glow main thread.
            std::thread::Builder::new()
                .name("portalshot-capture".into())
                .spawn(move || {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("Failed to build tokio runtime");

                    rt.block_on(runner::run(config, inbox, state_bg, preview_bg, ctx_bg, exclude));
                })
                .expect("Failed to spawn capture thread");

            Ok(Box::new(gui_app::PortalshotApp::new(cc, shared_state, preview, handle)))
        }),
    )
}
