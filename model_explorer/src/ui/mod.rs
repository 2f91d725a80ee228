mod hud;
mod inspector;
mod minimap;
mod timeline;

use bevy_egui::egui;

pub use hud::{hud_plugin, HudState};
pub use inspector::{inspector_plugin, InspectorState, PreviewCache};
pub use minimap::minimap_plugin;
pub use timeline::timeline_plugin;

const ACCENT: egui::Color32 = egui::Color32::from_rgb(100, 220, 180);
const MUTED: egui::Color32 = egui::Color32::from_rgb(140, 160, 180);

fn panel_frame() -> egui::Frame {
    egui::Frame::default()
        .fill(egui::Color32::from_rgba_premultiplied(15, 15, 25, 210))
        .inner_margin(egui::Margin::same(12))
        .corner_radius(egui::CornerRadius::same(6))
}

fn apply_panel_style(ui: &mut egui::Ui) {
    ui.style_mut().override_text_style = Some(egui::TextStyle::Monospace);
    ui.visuals_mut().override_text_color = Some(egui::Color32::from_rgb(200, 220, 240));
}
