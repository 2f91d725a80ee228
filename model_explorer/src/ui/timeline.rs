//! Timeline scrubber: bottom panel with playback controls, the phase scrubber and an overall
//! progress bar marked at phase boundaries.

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};

use super::{apply_panel_style, ACCENT, MUTED};
use crate::walkthrough::{FrameSet, Phase, Walkthrough, WalkthroughEngine, SPEEDS};

pub fn timeline_plugin(app: &mut App) {
    app.add_systems(Update, timeline_ui_system.in_set(FrameSet::Input));
}

fn timeline_ui_system(
    mut contexts: EguiContexts,
    mut walkthrough: ResMut<Walkthrough>,
    engine: Res<WalkthroughEngine>,
) {
    egui::TopBottomPanel::bottom("timeline")
        .frame(
            egui::Frame::default()
                .fill(egui::Color32::from_rgba_premultiplied(15, 15, 25, 210))
                .inner_margin(egui::Margin::same(8))
                .corner_radius(egui::CornerRadius::same(0)),
        )
        .show(contexts.ctx_mut(), |ui| {
            apply_panel_style(ui);

            ui.horizontal(|ui| {
                if ui.button("<<").on_hover_text("Previous phase").clicked() {
                    walkthrough.prev();
                }
                let label = if walkthrough.running() { "Pause" } else { "Play" };
                if ui.button(label).clicked() {
                    walkthrough.toggle();
                }
                if ui.button(">>").on_hover_text("Next phase").clicked() {
                    walkthrough.next();
                }
                if ui.button("Restart").clicked() {
                    walkthrough.restart();
                }

                let mut speed = walkthrough.speed();
                egui::ComboBox::from_id_salt("speed")
                    .selected_text(format!("{speed}x"))
                    .width(60.0)
                    .show_ui(ui, |ui| {
                        for s in SPEEDS {
                            ui.selectable_value(&mut speed, s, format!("{s}x"));
                        }
                    });
                if speed != walkthrough.speed() {
                    walkthrough.set_speed(speed);
                }

                ui.checkbox(&mut walkthrough.autoplay, "Autoplay");

                ui.separator();
                ui.label(
                    egui::RichText::new(format!(
                        "{:>5.1}s / {:.1}s",
                        walkthrough.time(),
                        walkthrough.phase_length()
                    ))
                    .color(ACCENT),
                );
            });
            ui.add_space(4.0);

            scrubber(ui, &mut walkthrough, engine.script().breakpoints());
            ui.add_space(4.0);
            progress_bar(ui, &mut walkthrough);
        });
}

/// Slider over the current phase. Dragging pauses playback.
fn scrubber(ui: &mut egui::Ui, walkthrough: &mut Walkthrough, breakpoints: &[f32]) {
    let length = walkthrough.phase_length().max(f32::EPSILON);
    let mut time = walkthrough.time();
    ui.spacing_mut().slider_width = ui.available_width() - 8.0;
    let response = ui.add(
        egui::Slider::new(&mut time, 0.0..=length)
            .show_value(false)
            .trailing_fill(true),
    );
    if response.changed() {
        walkthrough.pause();
        walkthrough.scrub(time);
    }

    let rect = response.rect;
    let painter = ui.painter();
    for &b in breakpoints {
        let x = rect.left() + rect.width() * (b / length).clamp(0.0, 1.0);
        painter.line_segment(
            [egui::pos2(x, rect.top()), egui::pos2(x, rect.top() + 4.0)],
            egui::Stroke::new(1.0, MUTED),
        );
    }
}

/// Whole walkthrough, one tick per phase. Clicking a segment jumps to that phase.
fn progress_bar(ui: &mut egui::Ui, walkthrough: &mut Walkthrough) {
    let (response, painter) =
        ui.allocate_painter(egui::vec2(ui.available_width(), 8.0), egui::Sense::click());
    let rect = response.rect;
    painter.rect_filled(rect, 2.0, egui::Color32::from_rgb(40, 40, 55));

    let mut filled = rect;
    filled.set_width(rect.width() * walkthrough.progress());
    painter.rect_filled(filled, 2.0, egui::Color32::from_rgb(80, 180, 140));

    let n = Phase::ALL.len() as f32;
    for i in 1..Phase::ALL.len() {
        let x = rect.left() + rect.width() * i as f32 / n;
        painter.line_segment(
            [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())],
            egui::Stroke::new(1.0, egui::Color32::from_rgb(15, 15, 25)),
        );
    }

    if let Some(pos) = response.interact_pointer_pos() {
        if response.clicked() {
            if let Some(phase) = phase_at(rect.width(), pos.x - rect.left()) {
                walkthrough.jump_to(phase);
            }
        }
    }
    if let Some(pos) = response.hover_pos() {
        if let Some(phase) = phase_at(rect.width(), pos.x - rect.left()) {
            response.on_hover_text(phase.title());
        }
    }
}

fn phase_at(width: f32, x: f32) -> Option<Phase> {
    if width <= 0.0 || x < 0.0 {
        return None;
    }
    let index = (x / width * Phase::ALL.len() as f32) as usize;
    Phase::from_index(index.min(Phase::ALL.len() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_segments_map_to_phases() {
        let width = 110.0;
        assert_eq!(phase_at(width, 0.0), Some(Phase::Intro));
        assert_eq!(phase_at(width, 25.0), Some(Phase::Embedding));
        assert_eq!(phase_at(width, width), Some(Phase::Training));
        assert_eq!(phase_at(width, -1.0), None);
        assert_eq!(phase_at(0.0, 5.0), None);
    }
}
