//! HUD overlay: phase title, commentary, model stats, FPS counter.

use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin};

use super::{apply_panel_style, panel_frame, ACCENT, MUTED};
use crate::particles::ParticleFlowSystem;
use crate::scene::SceneModel;
use crate::walkthrough::{phase_groups, Phase, Walkthrough, WalkthroughChanged, WalkthroughEngine};

/// Counts phase transitions seen by the HUD.
#[derive(Resource, Default, Debug)]
pub struct HudState {
    pub phase: Option<Phase>,
    pub transitions: u64,
}

pub fn hud_plugin(app: &mut App) {
    app.add_plugins(EguiPlugin)
        .add_plugins(FrameTimeDiagnosticsPlugin)
        .init_resource::<HudState>()
        .add_systems(Update, (track_transitions, hud_overlay_system).chain());
}

fn track_transitions(mut events: EventReader<WalkthroughChanged>, mut hud: ResMut<HudState>) {
    for event in events.read() {
        hud.phase = Some(event.phase);
        hud.transitions += 1;
    }
}

fn hud_overlay_system(
    mut contexts: EguiContexts,
    walkthrough: Res<Walkthrough>,
    engine: Res<WalkthroughEngine>,
    model: Res<SceneModel>,
    particles: Res<ParticleFlowSystem>,
    diagnostics: Res<DiagnosticsStore>,
) {
    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|d| d.smoothed())
        .unwrap_or(0.0);

    let phase = walkthrough.phase();
    let group = phase_groups()
        .into_iter()
        .find(|g| g.id == phase.group())
        .map_or("", |g| g.title);
    let commentary = engine.script().commentary_at(walkthrough.time());

    egui::Window::new("Walkthrough")
        .anchor(egui::Align2::LEFT_TOP, [10.0, 10.0])
        .resizable(false)
        .collapsible(false)
        .title_bar(false)
        .max_width(360.0)
        .frame(panel_frame())
        .show(contexts.ctx_mut(), |ui| {
            apply_panel_style(ui);

            ui.label(egui::RichText::new(group).size(11.0).color(MUTED));
            ui.label(egui::RichText::new(phase.title()).size(16.0).color(ACCENT));
            ui.add_space(6.0);

            if let Some(text) = commentary {
                ui.add(egui::Label::new(text).wrap());
                ui.add_space(6.0);
            }

            ui.separator();
            let shape = &model.layout.shape;
            ui.label(format!(
                "T {}  C {}  heads {}  layers {}",
                shape.seq_len, shape.channels, shape.heads, shape.layers
            ));
            ui.label(format!(
                "Params     {}",
                format_count(model.layout.parameter_count())
            ));
            ui.label(format!(
                "Particles  {}/{}",
                particles.alive_count(),
                particles.capacity()
            ));
            ui.label(format!("FPS  {fps:.0}"));
        });
}

fn format_count(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_abbreviated() {
        assert_eq!(format_count(85_584), "85.6K");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(2_500_000), "2.50M");
    }

    #[test]
    fn transitions_are_tracked_from_events() {
        let mut app = App::new();
        app.add_event::<WalkthroughChanged>()
            .init_resource::<HudState>()
            .add_systems(Update, track_transitions);

        app.world_mut().send_event(WalkthroughChanged {
            phase: Phase::Embedding,
        });
        app.world_mut().send_event(WalkthroughChanged {
            phase: Phase::LayerNorm,
        });
        app.update();

        let hud = app.world().resource::<HudState>();
        assert_eq!(hud.transitions, 2);
        assert_eq!(hud.phase, Some(Phase::LayerNorm));
    }
}
