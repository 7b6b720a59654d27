use std::sync::{Arc, Mutex};

use eframe::glow;
use portalshot_capture::CaptureSession;
use portalshot_core::{CaptureConfig, CaptureRegion};
use portalshot_renderer::egl::EglRenderer;
use portalshot_renderer::{PresentationSurface, RedrawOutcome};
use tracing::{trace, warn};

/// Surface changes requested from the capture thread. They are applied at the
/// start of the next paint callback, where the GL context is current.
pub enum SurfaceOp {
    Attach(Arc<dyn CaptureSession>),
    Detach,
    Resize(CaptureRegion),
}

/// GUI-thread side of the live preview.
pub struct Preview {
    surface: PresentationSurface<glow::Texture>,
    renderer: Option<EglRenderer>,
    egl_debug: bool,
    pending: Vec<SurfaceOp>,
}

pub type SharedPreview = Arc<Mutex<Preview>>;

impl Preview {
    pub fn new(config: &CaptureConfig, ctx: egui::Context) -> Self {
        Self {
            surface: PresentationSurface::new(config.import_path, move || ctx.request_repaint()),
            renderer: None,
            egl_debug: config.egl_debug,
            pending: Vec::new(),
        }
    }

    pub fn queue(&mut self, op: SurfaceOp) {
        self.pending.push(op);
    }

    pub fn size(&self) -> (u32, u32) {
        self.surface.size()
    }

    /// Runs inside the egui_glow paint callback.
    pub fn paint(&mut self, gl: &glow::Context) {
        let egl_debug = self.egl_debug;
        let Self { surface, renderer, pending, .. } = self;
        let renderer = renderer.get_or_insert_with(|| EglRenderer::load(egl_debug));
        let mut backend = match renderer.bind(gl) {
            Ok(b) => b,
            Err(e) => {
                warn!("Preview pipeline unavailable: {e}");
                return;
            }
        };

        for op in pending.drain(..) {
            match op {
                SurfaceOp::Attach(session) => surface.set_session(Some(session), &mut backend),
                SurfaceOp::Detach => surface.set_session(None, &mut backend),
                SurfaceOp::Resize(region) => {
                    surface.resize(&region);
                }
            }
        }

        match surface.redraw(&mut backend) {
            Ok(RedrawOutcome::Dropped) => trace!("frame dropped ({} total)", surface.dropped_frames()),
            Ok(_) => {}
            Err(e) => warn!("Preview redraw failed: {e}"),
        }
    }

    /// Releases the session, texture and GL objects. Called from `on_exit`.
    pub fn destroy(&mut self, gl: &glow::Context) {
        self.pending.clear();
        let Some(renderer) = self.renderer.as_mut() else { return };
        if let Ok(mut backend) = renderer.bind(gl) {
            self.surface.destroy(&mut backend);
        }
        renderer.destroy(gl);
    }
}
