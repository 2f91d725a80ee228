//! Table of contents: phase groups with one button per phase.

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};

use super::{apply_panel_style, panel_frame, ACCENT, MUTED};
use crate::walkthrough::{FrameSet, Walkthrough};

pub fn minimap_plugin(app: &mut App) {
    app.add_systems(Update, minimap_ui_system.in_set(FrameSet::Input));
}

fn minimap_ui_system(mut contexts: EguiContexts, mut walkthrough: ResMut<Walkthrough>) {
    let current = walkthrough.phase();
    let mut target = None;

    egui::Window::new("Phases")
        .anchor(egui::Align2::RIGHT_TOP, [-10.0, 10.0])
        .resizable(false)
        .collapsible(true)
        .title_bar(false)
        .frame(panel_frame())
        .show(contexts.ctx_mut(), |ui| {
            apply_panel_style(ui);
            for group in walkthrough.groups() {
                ui.label(egui::RichText::new(group.title).size(11.0).color(MUTED));
                for &phase in &group.phases {
                    let text = if phase == current {
                        egui::RichText::new(phase.title()).color(ACCENT)
                    } else {
                        egui::RichText::new(phase.title())
                    };
                    if ui.selectable_label(phase == current, text).clicked() {
                        target = Some(phase);
                    }
                }
                ui.add_space(4.0);
            }
        });

    if let Some(phase) = target {
        walkthrough.jump_to(phase);
    }
}
