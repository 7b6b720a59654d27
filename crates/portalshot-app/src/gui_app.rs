use std::path::PathBuf;
use std::sync::Arc;

use egui::{
    Align, Color32, FontFamily, FontId, Frame, Layout, Margin, RichText, ScrollArea, Stroke, Vec2,
};
use portalshot_app::state::state_color;
use portalshot_app::{CaptureState, OrchestratorHandle, SharedState};
use portalshot_core::{CaptureMode, CaptureRegion};
use tracing::debug;

use crate::preview::SharedPreview;

// ── Colours ───────────────────────────────────────────────────────────────────

const BG_PANEL:  Color32 = Color32::from_rgb(28,  30,  36);
const BG_INSET:  Color32 = Color32::from_rgb(20,  22,  28);
const BG_CARD:   Color32 = Color32::from_rgb(36,  38,  46);
const ACCENT:    Color32 = Color32::from_rgb(99, 144, 255);
const TEXT_DIM:  Color32 = Color32::from_rgb(130, 135, 148);
const TEXT_NORM: Color32 = Color32::from_rgb(210, 215, 230);

/// Height of the toolbar row in logical pixels.
pub const TOOLBAR_HEIGHT: f32 = 44.0;

// ── App struct ────────────────────────────────────────────────────────────────

pub struct PortalshotApp {
    state:            SharedState,
    preview:          SharedPreview,
    handle:           OrchestratorHandle,
    placed_region:    Option<CaptureRegion>,
    show_logs:        bool,
    auto_scroll_logs: bool,
}

impl PortalshotApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        state: SharedState,
        preview: SharedPreview,
        handle: OrchestratorHandle,
    ) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill             = BG_PANEL;
        visuals.panel_fill              = BG_PANEL;
        visuals.extreme_bg_color        = BG_INSET;
        visuals.faint_bg_color          = BG_CARD;
        visuals.widgets.inactive.bg_fill  = BG_CARD;
        visuals.widgets.hovered.bg_fill   = Color32::from_rgb(50, 53, 65);
        visuals.widgets.active.bg_fill    = Color32::from_rgb(65, 68, 82);
        cc.egui_ctx.set_visuals(visuals);

        let mut style = (*cc.egui_ctx.style()).clone();
        style.text_styles.insert(
            egui::TextStyle::Button,
            FontId::new(13.5, FontFamily::Proportional),
        );
        cc.egui_ctx.set_style(style);

        Self {
            state,
            preview,
            handle,
            placed_region:    None,
            show_logs:        false,
            auto_scroll_logs: true,
        }
    }

    /// Moves the window so the toolbar sits under the captured region, and
    /// sizes it to hold the preview.
    fn place_window(&mut self, ctx: &egui::Context, region: CaptureRegion) {
        if self.placed_region == Some(region) {
            return;
        }
        let Some(monitor) = ctx.input(|i| i.viewport().monitor_size) else { return };
        let (x, y) = region.toolbar_anchor(monitor.y as i32, TOOLBAR_HEIGHT as i32);
        debug!("Placing toolbar at ({x}, {y}) for {region}");
        ctx.send_viewport_cmd(egui::ViewportCommand::OuterPosition(egui::pos2(x as f32, y as f32)));
        ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(Vec2::new(
            (region.width as f32).max(420.0),
            region.height as f32 + TOOLBAR_HEIGHT,
        )));
        self.placed_region = Some(region);
    }
}

// ── eframe::App implementation ────────────────────────────────────────────────

impl eframe::App for PortalshotApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Snapshot state to avoid holding the lock across rendering
        let snap = {
            let s = self.state.lock().unwrap();
            StateSnapshot {
                state:      s.state.clone(),
                mode:       s.mode,
                region:     s.region,
                live:       s.live,
                last_saved: s.last_saved.clone(),
                last_error: s.last_error.clone(),
                logs:       s.logs.iter().cloned().collect(),
            }
        };

        if let Some(region) = snap.region {
            self.place_window(ctx, region);
        }

        egui::TopBottomPanel::top("toolbar")
            .exact_height(TOOLBAR_HEIGHT)
            .frame(Frame::none().fill(BG_PANEL).inner_margin(Margin::symmetric(8.0, 6.0)))
            .show(ctx, |ui| self.render_toolbar(ui, &snap));

        egui::CentralPanel::default()
            .frame(Frame::none().fill(BG_INSET))
            .show(ctx, |ui| {
                if self.show_logs {
                    render_log_panel(ui, &snap.logs, &mut self.auto_scroll_logs);
                } else {
                    self.render_preview(ui, &snap);
                }
            });
    }

    fn on_exit(&mut self, gl: Option<&eframe::glow::Context>) {
        self.handle.shutdown();
        if let Some(gl) = gl {
            self.preview.lock().unwrap().destroy(gl);
        }
    }
}

// ── Rendering helpers ─────────────────────────────────────────────────────────

impl PortalshotApp {
    fn render_toolbar(&mut self, ui: &mut egui::Ui, snap: &StateSnapshot) {
        ui.horizontal_centered(|ui| {
            // Mode toggle
            for mode in [CaptureMode::Screenshot, CaptureMode::Record] {
                let selected = snap.mode == mode;
                let text = RichText::new(mode.to_string())
                    .color(if selected { Color32::WHITE } else { TEXT_DIM });
                let button = egui::Button::new(text)
                    .fill(if selected { ACCENT } else { BG_CARD })
                    .stroke(Stroke::new(1.0, Color32::from_rgb(50, 53, 68)));
                if ui.add_sized([92.0, 28.0], button).clicked() && !selected {
                    self.handle.set_mode(mode);
                }
            }

            ui.add_space(8.0);
            let selecting = snap.state == CaptureState::Selecting;
            if ui
                .add_enabled(selecting, egui::Button::new("Finish").fill(BG_CARD))
                .clicked()
            {
                self.handle.finish_selection();
            }
            if ui
                .add_enabled(snap.state.can_restart(), egui::Button::new("New capture").fill(BG_CARD))
                .clicked()
            {
                self.handle.restart();
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                let logs_label = if self.show_logs { "Preview" } else { "Log" };
                if ui.button(RichText::new(logs_label).color(TEXT_DIM)).clicked() {
                    self.show_logs = !self.show_logs;
                }
                ui.add_space(6.0);
                render_status(ui, snap);
            });
        });
    }

    fn render_preview(&mut self, ui: &mut egui::Ui, snap: &StateSnapshot) {
        let available = ui.available_size();
        let (w, h) = self.preview.lock().unwrap().size();
        let size = fit(Vec2::new(w as f32, h as f32), available);
        let (rect, _) = ui.allocate_exact_size(available, egui::Sense::hover());
        let rect = egui::Rect::from_center_size(rect.center(), size);

        if !snap.live {
            let hint = match &snap.state {
                CaptureState::Saved(path) => format!("Saved {}", path.display()),
                state => state.label().to_string(),
            };
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                hint,
                FontId::new(14.0, FontFamily::Proportional),
                TEXT_DIM,
            );
        }

        // Pending surface ops are applied in here even while nothing is live.
        let preview = Arc::clone(&self.preview);
        let callback = egui::PaintCallback {
            rect,
            callback: Arc::new(eframe::egui_glow::CallbackFn::new(move |_info, painter| {
                preview.lock().unwrap().paint(painter.gl());
            })),
        };
        ui.painter().add(callback);
    }
}

fn render_status(ui: &mut egui::Ui, snap: &StateSnapshot) {
    if let Some(err) = &snap.last_error {
        ui.label(
            RichText::new(err)
                .color(Color32::from_rgb(220, 100, 100))
                .font(FontId::new(12.0, FontFamily::Proportional)),
        );
    } else if let Some(path) = &snap.last_saved {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        ui.label(
            RichText::new(name)
                .color(TEXT_DIM)
                .font(FontId::new(12.0, FontFamily::Proportional)),
        );
    }
    ui.label(RichText::new(snap.state.label()).strong().color(TEXT_NORM));

    // Coloured status dot
    let (rect, _) = ui.allocate_exact_size(Vec2::splat(12.0), egui::Sense::hover());
    ui.painter().circle_filled(rect.center(), 5.0, state_color(&snap.state));
}

fn render_log_panel(ui: &mut egui::Ui, logs: &[String], auto_scroll: &mut bool) {
    Frame::none()
        .fill(BG_INSET)
        .inner_margin(Margin::symmetric(8.0, 6.0))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    RichText::new("Log")
                        .color(TEXT_DIM)
                        .font(FontId::new(12.0, FontFamily::Proportional)),
                );
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    ui.checkbox(auto_scroll, RichText::new("auto-scroll").color(TEXT_DIM));
                });
            });
            ScrollArea::vertical()
                .id_salt("log_scroll")
                .auto_shrink([false, false])
                .stick_to_bottom(*auto_scroll)
                .show(ui, |ui| {
                    for line in logs {
                        let color = if line.starts_with("[ERROR]") {
                            Color32::from_rgb(220, 80, 70)
                        } else {
                            Color32::from_rgb(160, 170, 185)
                        };
                        ui.label(
                            RichText::new(line)
                                .font(FontId::new(11.5, FontFamily::Monospace))
                                .color(color),
                        );
                    }
                });
        });
}

// ── Utilities ─────────────────────────────────────────────────────────────────

/// Largest size with `content`'s aspect ratio that fits in `bounds`. An empty
/// content size fills the bounds.
fn fit(content: Vec2, bounds: Vec2) -> Vec2 {
    if content.x <= 0.0 || content.y <= 0.0 {
        return bounds;
    }
    let scale = (bounds.x / content.x).min(bounds.y / content.y).min(1.0);
    content * scale
}

// ── Snapshot (to avoid holding lock during paint) ─────────────────────────────

struct StateSnapshot {
    state:      CaptureState,
    mode:       CaptureMode,
    region:     Option<CaptureRegion>,
    live:       bool,
    last_saved: Option<PathBuf>,
    last_error: Option<String>,
    logs:       Vec<String>,
}
