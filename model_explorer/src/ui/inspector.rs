//! Cell inspector: hover a block to see which cell is under the pointer, its value and how it
//! is computed. Clicking pins the cell until Esc.
//!
//! Uses manual ray-AABB intersection against the composed cuboid batch instead of Bevy's mesh
//! picking to avoid input absorption conflicts with bevy_egui.

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};

use super::{apply_panel_style, ACCENT, MUTED};
use crate::layout::deps::CellRef;
use crate::layout::{Axis, CellSource, DependencyResolver, Evaluator, ValueCache};
use crate::render::{CuboidBatch, HoverTarget};
use crate::scene::SceneModel;
use crate::walkthrough::{FrameSet, WalkthroughChanged};

#[derive(Resource, Default, Debug)]
pub struct InspectorState {
    pub pinned: Option<CellRef>,
}

/// Cell values computed for the tooltip, kept until the model changes.
#[derive(Resource, Default, Debug)]
pub struct PreviewCache(pub ValueCache);

pub fn inspector_plugin(app: &mut App) {
    app.init_resource::<InspectorState>()
        .init_resource::<PreviewCache>()
        .add_systems(
            Update,
            (hover_raycast_system, pin_selection_system, inspector_panel_system)
                .chain()
                .after(FrameSet::Render),
        )
        .add_systems(Update, clear_cache_on_change);
}

fn hover_raycast_system(
    windows: Query<&Window>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    mut contexts: EguiContexts,
    batch: Res<CuboidBatch>,
    mut hover: ResMut<HoverTarget>,
) {
    let cell = pointer_ray(&windows, &cameras, &mut contexts)
        .and_then(|(origin, dir)| batch.pick(origin, dir));
    if hover.cell != cell {
        hover.cell = cell;
    }
}

fn pointer_ray(
    windows: &Query<&Window>,
    cameras: &Query<(&Camera, &GlobalTransform)>,
    contexts: &mut EguiContexts,
) -> Option<(Vec3, Vec3)> {
    if contexts.ctx_mut().is_pointer_over_area() {
        return None;
    }
    let window = windows.get_single().ok()?;
    let cursor_pos = window.cursor_position()?;
    let (camera, cam_transform) = cameras.get_single().ok()?;
    let ray = camera.viewport_to_world(cam_transform, cursor_pos).ok()?;
    Some((ray.origin, *ray.direction))
}

fn pin_selection_system(
    mouse: Res<ButtonInput<MouseButton>>,
    keys: Res<ButtonInput<KeyCode>>,
    hover: Res<HoverTarget>,
    mut state: ResMut<InspectorState>,
) {
    if keys.just_pressed(KeyCode::Escape) {
        state.pinned = None;
    }
    if mouse.just_pressed(MouseButton::Left) {
        if let Some(cell) = hover.cell {
            state.pinned = if state.pinned == Some(cell) { None } else { Some(cell) };
        }
    }
}

fn clear_cache_on_change(
    mut events: EventReader<WalkthroughChanged>,
    model: Res<SceneModel>,
    mut cache: ResMut<PreviewCache>,
) {
    let transitioned = events.read().count() > 0;
    if transitioned || model.is_changed() {
        cache.0.clear();
    }
}

fn inspector_panel_system(
    mut contexts: EguiContexts,
    hover: Res<HoverTarget>,
    state: Res<InspectorState>,
    model: Res<SceneModel>,
    mut cache: ResMut<PreviewCache>,
) {
    let (target, pinned) = match (state.pinned, hover.cell) {
        (Some(cell), _) => (cell, true),
        (None, Some(cell)) => (cell, false),
        (None, None) => return,
    };
    let details = describe(&model, &mut cache.0, target);

    let ctx = contexts.ctx_mut();
    let anchor = if pinned {
        None
    } else {
        ctx.pointer_hover_pos()
    };

    let mut window = egui::Window::new("inspector")
        .title_bar(false)
        .resizable(false)
        .collapsible(false)
        .frame(inspector_frame());
    window = match anchor {
        Some(pos) => window.fixed_pos(pos + egui::vec2(16.0, 16.0)),
        None => window.anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -90.0]),
    };

    window.show(ctx, |ui| {
        apply_panel_style(ui);
        ui.label(egui::RichText::new(&details.name).size(15.0).color(ACCENT));
        ui.label(egui::RichText::new(details.kind).size(11.0).color(MUTED));
        ui.add_space(6.0);

        ui.label(format!("Cell   {}", details.cell));
        ui.label(format!("Dims   {}", details.dims));
        match details.value {
            Some(v) => ui.label(format!("Value  {v:.4}")),
            None => ui.label("Value  -"),
        };
        ui.label(format!("Op     {}", details.op));

        if pinned {
            ui.add_space(8.0);
            dismiss_hint(ui);
        }
    });
}

#[derive(Debug, Clone, PartialEq)]
struct CellDetails {
    name: String,
    kind: &'static str,
    cell: String,
    dims: String,
    value: Option<f32>,
    op: &'static str,
}

fn describe(model: &SceneModel, cache: &mut ValueCache, target: CellRef) -> CellDetails {
    let layout = &model.layout;
    let block = layout.block(target.block);
    let resolver = DependencyResolver::new(layout, &model.weights.tokens);
    let op = match resolver.classify(target.block, target.cell) {
        CellSource::Stored => "stored",
        CellSource::Masked => "masked",
        CellSource::OutOfRange => "n/a",
        CellSource::Derived(dep) => dep.operation(),
    };
    let value = Evaluator::new(layout, &model.weights, cache).value(target.block, target.cell);

    CellDetails {
        name: block.name.clone(),
        kind: block.kind.label(),
        cell: format!("({}, {})", target.cell.x, target.cell.y),
        dims: format!(
            "{} {} x {} {}",
            block.extent(Axis::X),
            block.dim_style(Axis::X).label(),
            block.extent(Axis::Y),
            block.dim_style(Axis::Y).label(),
        ),
        value,
        op,
    }
}

fn inspector_frame() -> egui::Frame {
    egui::Frame::default()
        .fill(egui::Color32::from_rgba_premultiplied(15, 15, 25, 220))
        .inner_margin(egui::Margin::same(14))
}

fn dismiss_hint(ui: &mut egui::Ui) {
    ui.label(
        egui::RichText::new("Esc to dismiss")
            .size(11.0)
            .color(egui::Color32::from_rgb(120, 120, 140)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ModelWeights;
    use crate::layout::{build_layout, CellIdx, ModelShape};

    fn model() -> SceneModel {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let weights = ModelWeights::synthetic(&layout, 11);
        SceneModel::new(layout, weights)
    }

    #[test]
    fn stored_cells_report_their_weight() {
        let model = model();
        let mut cache = ValueCache::default();
        let tok_embed = model.layout.embedding.tok_embed;
        let details = describe(&model, &mut cache, CellRef::new(tok_embed, CellIdx::new(1, 2)));
        assert_eq!(details.op, "stored");
        let stored = model
            .weights
            .stored(model.layout.block(tok_embed), CellIdx::new(1, 2));
        assert_eq!(details.value, stored);
    }

    #[test]
    fn masked_attention_has_no_value() {
        let model = model();
        let mut cache = ValueCache::default();
        let attn = model.layout.layers[0].heads[0].attn;
        let details = describe(&model, &mut cache, CellRef::new(attn, CellIdx::new(4, 1)));
        assert_eq!(details.op, "masked");
        assert_eq!(details.value, None);
    }

    #[test]
    fn residual_cells_are_computed() {
        let model = model();
        let mut cache = ValueCache::default();
        let residual = model.layout.embedding.residual;
        let details = describe(&model, &mut cache, CellRef::new(residual, CellIdx::new(3, 0)));
        assert!(details.value.is_some());
        assert_ne!(details.op, "stored");
        assert!(!cache.is_empty());
    }
}
