//! CPU side of the cuboid pass: one flat instance list per frame, rebuilt from the overlay.

use bevy::color::{Alpha, LinearRgba};
use bevy::prelude::*;

use super::palette;
use super::CuboidSettings;
use crate::layout::deps::CellRef;
use crate::layout::grid::Footprint;
use crate::layout::{BlockRef, ModelLayout};
use crate::walkthrough::FrameOverlay;

/// Instances fainter than this are not drawn or picked.
const MIN_ALPHA: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InstanceKind {
    /// A base block or a piece of one; carries the footprint used for picking.
    Block { piece: BlockRef, footprint: Footprint },
    /// Thin box drawn around a highlighted span of cells.
    Highlight,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CuboidInstance {
    pub min: Vec3,
    pub size: Vec3,
    pub color: LinearRgba,
    pub kind: InstanceKind,
}

impl CuboidInstance {
    pub fn max(&self) -> Vec3 {
        self.min + self.size
    }

    pub fn center(&self) -> Vec3 {
        self.min + self.size * 0.5
    }
}

/// The cell under the pointer, if any.
#[derive(Resource, Default, Clone, Copy, Debug, PartialEq)]
pub struct HoverTarget {
    pub cell: Option<CellRef>,
}

#[derive(Resource, Default, Debug)]
pub struct CuboidBatch {
    instances: Vec<CuboidInstance>,
}

impl CuboidBatch {
    #[cfg(test)]
    pub(crate) fn from_instances(instances: Vec<CuboidInstance>) -> Self {
        Self { instances }
    }

    pub fn instances(&self) -> &[CuboidInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Replaces the batch with the blocks and highlights of `overlay`.
    pub fn rebuild(
        &mut self,
        layout: &ModelLayout,
        overlay: &FrameOverlay,
        settings: &CuboidSettings,
    ) {
        self.instances.clear();

        let mut pieces = Vec::new();
        for (piece, footprint, style) in overlay.grid.drawables(layout) {
            let color = palette::block_color(layout.block(footprint.root).kind, &style);
            if color.alpha() < MIN_ALPHA {
                continue;
            }
            let (min, size) = inset(footprint.position, footprint.size, settings.gap);
            self.instances.push(CuboidInstance {
                min,
                size,
                color,
                kind: InstanceKind::Block { piece, footprint },
            });
            pieces.push(footprint);
        }

        for hl in &overlay.highlights {
            let alpha = hl.strength * settings.highlight_alpha;
            if alpha < MIN_ALPHA {
                continue;
            }
            let span = hl.span;
            for footprint in pieces.iter().filter(|fp| fp.root == span.block) {
                let Some((min, size)) = footprint.span_box(span.start, span.axis, span.len)
                else {
                    continue;
                };
                let pad = Vec3::splat(settings.highlight_pad);
                self.instances.push(CuboidInstance {
                    min: min - pad,
                    size: size + pad * 2.0,
                    color: hl.color.with_alpha(alpha),
                    kind: InstanceKind::Highlight,
                });
            }
        }
    }

    /// Nearest block piece hit by the ray, mapped back to the cell of the block that owns it.
    pub fn pick(&self, origin: Vec3, dir: Vec3) -> Option<CellRef> {
        let mut best: Option<(f32, CellRef)> = None;
        for inst in &self.instances {
            let InstanceKind::Block { footprint, .. } = inst.kind else {
                continue;
            };
            let Some(dist) = ray_aabb_intersect(origin, dir, inst.min, inst.max()) else {
                continue;
            };
            if best.is_none_or(|(d, _)| dist < d) {
                let cell = footprint.cell_at(origin + dir * dist);
                best = Some((dist, CellRef::new(footprint.root, cell)));
            }
        }
        best.map(|(_, hit)| hit)
    }
}

fn inset(position: Vec3, size: Vec3, gap: f32) -> (Vec3, Vec3) {
    let gap = Vec3::splat(gap).min(size * 0.25);
    (position + gap, size - gap * 2.0)
}

pub(crate) fn ray_aabb_intersect(
    origin: Vec3,
    dir: Vec3,
    aabb_min: Vec3,
    aabb_max: Vec3,
) -> Option<f32> {
    let inv_dir = 1.0 / dir;
    let t1 = (aabb_min - origin) * inv_dir;
    let t2 = (aabb_max - origin) * inv_dir;
    let t_min = t1.min(t2);
    let t_max = t1.max(t2);
    let t_enter = t_min.x.max(t_min.y).max(t_min.z);
    let t_exit = t_max.x.min(t_max.y).min(t_max.z);
    if t_enter <= t_exit && t_exit > 0.0 {
        Some(t_enter.max(0.0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraState;
    use crate::layout::{build_layout, Axis, CellIdx, ModelShape, Span};

    fn setup() -> (ModelLayout, FrameOverlay) {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let overlay = FrameOverlay::new(&layout, CameraState::default());
        (layout, overlay)
    }

    #[test]
    fn every_visible_block_becomes_one_instance() {
        let (layout, overlay) = setup();
        let mut batch = CuboidBatch::default();
        batch.rebuild(&layout, &overlay, &CuboidSettings::default());
        assert_eq!(batch.len(), layout.len());
    }

    #[test]
    fn transparent_blocks_are_skipped() {
        let (layout, mut overlay) = setup();
        let residual = layout.embedding.residual;
        overlay.set_opacity(&[residual], 0.0);
        let mut batch = CuboidBatch::default();
        batch.rebuild(&layout, &overlay, &CuboidSettings::default());
        assert_eq!(batch.len(), layout.len() - 1);
    }

    #[test]
    fn highlights_follow_split_pieces() {
        let (layout, mut overlay) = setup();
        let residual = layout.embedding.residual;
        let split = overlay
            .grid
            .split(&layout, BlockRef::Base(residual), Axis::X, 2.0, 1.0)
            .unwrap();
        overlay.highlight(Span::cell(residual, CellIdx::new(2, 0)), palette::DEP_TARGET, 1.0);

        let mut batch = CuboidBatch::default();
        batch.rebuild(&layout, &overlay, &CuboidSettings::default());

        let highlight = batch
            .instances()
            .iter()
            .find(|i| i.kind == InstanceKind::Highlight)
            .unwrap();
        let focus = overlay.grid.footprint(&layout, split.focus).unwrap();
        let inside = highlight.center().cmpge(focus.position).all()
            && highlight.center().cmple(focus.position + focus.size).all();
        assert!(inside);
    }

    #[test]
    fn picking_maps_a_hit_to_the_root_cell() {
        let (layout, overlay) = setup();
        let mut batch = CuboidBatch::default();
        batch.rebuild(&layout, &overlay, &CuboidSettings::default());

        let residual = layout.block(layout.embedding.residual);
        let cell = CellIdx::new(3, 5);
        let target = residual.cell_center(cell);
        let origin = target + Vec3::Z * 100.0;
        let hit = batch.pick(origin, -Vec3::Z).unwrap();
        assert_eq!(hit, CellRef::new(residual.id, cell));
    }

    #[test]
    fn ray_misses_box_behind_origin() {
        let hit = ray_aabb_intersect(Vec3::new(0.5, 0.5, 5.0), Vec3::Z, Vec3::ZERO, Vec3::ONE);
        assert_eq!(hit, None);
        let hit = ray_aabb_intersect(Vec3::new(0.5, 0.5, 5.0), -Vec3::Z, Vec3::ZERO, Vec3::ONE);
        assert_eq!(hit, Some(4.0));
    }
}
