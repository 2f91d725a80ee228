//! Building blocks shared by the phase handlers.

use bevy::color::LinearRgba;
use bevy::math::Vec3;

use crate::camera::{zoom_to_fit, CameraState};
use crate::layout::deps::CellRef;
use crate::layout::{Axis, BlockId, BlockRef, CellIdx, CellSource, ModelLayout, Span};
use crate::render::palette;
use crate::walkthrough::engine::PhaseFrame;
use crate::walkthrough::overlay::FrameOverlay;

/// Flow particles per source block while a cell is being computed.
const FLOW_COUNT: usize = 4;

/// Camera framing the union of `ids`, looking from `yaw`/`pitch`.
pub fn camera_on(layout: &ModelLayout, ids: &[BlockId], yaw: f32, pitch: f32) -> CameraState {
    let (min, max) = layout.blocks_bounds(ids);
    let extent = (max - min).max_element().max(layout.cell * 4.0);
    CameraState::new((min + max) * 0.5, yaw, pitch, zoom_to_fit(extent))
}

/// Moves a camera's target by `offset` without changing its direction or distance.
pub fn shifted(camera: CameraState, offset: Vec3) -> CameraState {
    CameraState {
        target: camera.target + offset,
        ..camera
    }
}

/// Marks `cell` and every cell it is computed from. Masked and out-of-range cells only get the
/// target mark.
pub fn highlight_dependencies(
    frame: &PhaseFrame<'_>,
    overlay: &mut FrameOverlay,
    block: BlockId,
    cell: CellIdx,
    strength: f32,
) {
    overlay.highlight(Span::cell(block, cell), palette::DEP_TARGET, strength);
    match frame.resolver.classify(block, cell) {
        CellSource::Derived(dep) => {
            for span in dep.spans() {
                overlay.highlight(span, palette::DEP_SOURCE, strength * 0.8);
            }
        }
        CellSource::Masked => {
            overlay.highlight(Span::cell(block, cell), palette::MASKED, strength);
        }
        CellSource::Stored | CellSource::OutOfRange => {}
    }
}

/// Particles from every source block of `block` into it.
pub fn flow_into(frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, block: BlockId) {
    if let Some(dep) = frame.resolver.resolve(block, CellIdx::ZERO) {
        for src in dep.source_blocks() {
            if src != block {
                overlay.flow(src, block, palette::FLOW, FLOW_COUNT);
            }
        }
    }
}

/// Hides the values of every derived block computed at or after `first`.
pub fn hide_from(frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, first: BlockId) {
    let order = frame.layout.compute_order();
    if let Some(start) = order.iter().position(|&id| id == first) {
        overlay.hide_values(&order[start..]);
    }
}

/// Progressive reveal of a chain of blocks. Each block gets an equal share of `t`; inside a
/// block cells are revealed column by column, the current cell lit up together with its
/// sources. Returns the cell being computed, if any.
pub fn process_up_to(
    frame: &PhaseFrame<'_>,
    overlay: &mut FrameOverlay,
    blocks: &[BlockId],
    t: f32,
) -> Option<CellRef> {
    if blocks.is_empty() {
        return None;
    }
    let scaled = t.clamp(0.0, 1.0) * blocks.len() as f32;
    let mut current = None;

    for (i, &id) in blocks.iter().enumerate() {
        let local = (scaled - i as f32).clamp(0.0, 1.0);
        let base = BlockRef::Base(id);
        overlay.grid.modify(base, |s| s.values_hidden = local < 1.0);
        if local <= 0.0 || local >= 1.0 {
            continue;
        }

        let blk = frame.layout.block(id);
        let (w, h) = (blk.extent(Axis::X), blk.extent(Axis::Y));
        let total = w * h;
        let k = ((local * total as f32) as usize).min(total - 1);
        let cell = CellIdx::new(k / h, k % h);

        let Some(cols) = overlay
            .grid
            .split(frame.layout, base, Axis::X, cell.x as f32, 0.0)
        else {
            continue;
        };
        if let Some(done) = cols.before {
            overlay.grid.modify(done, |s| s.values_hidden = false);
        }
        if let Some(rows) = overlay
            .grid
            .split(frame.layout, cols.focus, Axis::Y, cell.y as f32, 0.0)
        {
            if let Some(done) = rows.before {
                overlay.grid.modify(done, |s| s.values_hidden = false);
            }
            overlay.grid.modify(rows.focus, |s| s.values_hidden = false);
            overlay.emphasize(rows.focus, 1.0);
        }

        highlight_dependencies(frame, overlay, id, cell, 1.0);
        flow_into(frame, overlay, id);
        current = Some(CellRef::new(id, cell));
    }
    current
}

/// Like [`process_up_to`], but only for column `x` of each block. A finished column stays
/// revealed while the rest of the block keeps its current style.
pub fn process_column(
    frame: &PhaseFrame<'_>,
    overlay: &mut FrameOverlay,
    blocks: &[BlockId],
    x: usize,
    t: f32,
) -> Option<CellRef> {
    if blocks.is_empty() {
        return None;
    }
    let scaled = t.clamp(0.0, 1.0) * blocks.len() as f32;
    let mut current = None;

    for (i, &id) in blocks.iter().enumerate() {
        let local = (scaled - i as f32).clamp(0.0, 1.0);
        if local <= 0.0 {
            continue;
        }
        let Some(cols) = overlay
            .grid
            .split(frame.layout, BlockRef::Base(id), Axis::X, x as f32, 0.0)
        else {
            continue;
        };
        if local >= 1.0 {
            overlay.grid.modify(cols.focus, |s| s.values_hidden = false);
            continue;
        }

        let h = frame.layout.block(id).extent(Axis::Y);
        let y = ((local * h as f32) as usize).min(h.saturating_sub(1));
        if let Some(rows) = overlay
            .grid
            .split(frame.layout, cols.focus, Axis::Y, y as f32, 0.0)
        {
            if let Some(done) = rows.before {
                overlay.grid.modify(done, |s| s.values_hidden = false);
            }
            overlay.grid.modify(rows.focus, |s| s.values_hidden = false);
            overlay.emphasize(rows.focus, 1.0);
        }
        let cell = CellIdx::new(x, y);
        highlight_dependencies(frame, overlay, id, cell, 1.0);
        flow_into(frame, overlay, id);
        current = Some(CellRef::new(id, cell));
    }
    current
}

/// Whole-block reveal of `blocks` in order; the block being reached pulses. Returns its index.
pub fn sweep(overlay: &mut FrameOverlay, blocks: &[BlockId], t: f32) -> Option<usize> {
    if blocks.is_empty() || t <= 0.0 {
        return None;
    }
    let scaled = t.clamp(0.0, 1.0) * blocks.len() as f32;
    let reached = scaled as usize;
    for &id in &blocks[..reached.min(blocks.len())] {
        overlay.grid.modify(BlockRef::Base(id), |s| s.values_hidden = false);
    }
    let &id = blocks.get(reached)?;
    overlay.emphasize(BlockRef::Base(id), pulse(scaled.fract()));
    Some(reached)
}

/// Fades `ids` from full opacity toward `floor` as `t` goes 0 → 1.
pub fn fade(overlay: &mut FrameOverlay, ids: &[BlockId], t: f32, floor: f32) {
    if t > 0.0 {
        overlay.set_opacity(ids, 1.0 - t.clamp(0.0, 1.0) * (1.0 - floor));
    }
}

/// Every block of the layout except `keep`.
pub fn all_except(layout: &ModelLayout, keep: &[BlockId]) -> Vec<BlockId> {
    layout
        .blocks()
        .iter()
        .map(|b| b.id)
        .filter(|id| !keep.contains(id))
        .collect()
}

/// `0 → 1 → 0` bump over `t`, for pulses and flashes.
pub fn pulse(t: f32) -> f32 {
    (t.clamp(0.0, 1.0) * std::f32::consts::PI).sin()
}

/// Colored flash over every cell of a block.
pub fn flash_block(
    frame: &PhaseFrame<'_>,
    overlay: &mut FrameOverlay,
    block: BlockId,
    color: LinearRgba,
    strength: f32,
) {
    let blk = frame.layout.block(block);
    for x in 0..blk.extent(Axis::X) {
        let span = Span {
            block,
            start: CellIdx::new(x, 0),
            axis: Axis::Y,
            len: blk.extent(Axis::Y),
        };
        overlay.highlight(span, color, strength);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EXAMPLE_TOKENS;
    use crate::layout::{build_layout, DependencyResolver, ModelShape};
    use crate::walkthrough::timeline::PhaseScript;

    fn with_frame(f: impl FnOnce(&PhaseFrame<'_>, &mut FrameOverlay)) {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let script = PhaseScript::empty();
        let frame = PhaseFrame {
            layout: &layout,
            resolver: DependencyResolver::new(&layout, &EXAMPLE_TOKENS),
            windows: script.evaluate(0.0),
            time: 0.0,
        };
        let mut overlay = FrameOverlay::new(&layout, CameraState::default());
        f(&frame, &mut overlay);
    }

    #[test]
    fn process_reveals_earlier_blocks_and_hides_later_ones() {
        with_frame(|frame, overlay| {
            let ln = &frame.layout.layers[0].ln1;
            let current = process_up_to(frame, overlay, &[ln.mean, ln.var, ln.out], 0.5).unwrap();
            assert_eq!(current.block, ln.var);
            assert!(!overlay.grid.style(BlockRef::Base(ln.mean)).values_hidden);
            assert!(overlay.grid.style(BlockRef::Base(ln.out)).values_hidden);
            assert!(overlay.grid.is_shadowed(BlockRef::Base(ln.var)));
            assert!(!overlay.highlights.is_empty());
            assert!(overlay.flows.iter().all(|f| f.to == ln.var));
        });
    }

    #[test]
    fn finished_process_leaves_blocks_whole() {
        with_frame(|frame, overlay| {
            let res = frame.layout.embedding.residual;
            assert!(process_up_to(frame, overlay, &[res], 1.0).is_none());
            assert!(!overlay.grid.is_shadowed(BlockRef::Base(res)));
            assert!(!overlay.grid.style(BlockRef::Base(res)).values_hidden);
            assert!(overlay.grid.transients().is_empty());
        });
    }

    #[test]
    fn column_process_reveals_one_column() {
        with_frame(|frame, overlay| {
            let out = frame.layout.layers[0].ln1.out;
            overlay.hide_values(&[out]);
            process_column(frame, overlay, &[out], 2, 1.0);
            let shown: Vec<_> = overlay
                .grid
                .drawables(frame.layout)
                .filter(|(_, fp, s)| fp.root == out && !s.values_hidden)
                .map(|(_, fp, _)| (fp.origin.x, fp.cells[0]))
                .collect();
            assert_eq!(shown, vec![(2, 1)]);
        });
    }

    #[test]
    fn masked_cells_are_marked() {
        with_frame(|frame, overlay| {
            let attn = frame.layout.layers[0].heads[0].attn;
            highlight_dependencies(frame, overlay, attn, CellIdx::new(4, 1), 1.0);
            assert!(overlay.highlights.iter().any(|h| h.color == palette::MASKED));
            assert!(overlay.highlights.iter().all(|h| h.color != palette::DEP_SOURCE));
        });
    }

    #[test]
    fn pulse_peaks_midway() {
        assert_eq!(pulse(0.0), 0.0);
        assert!((pulse(0.5) - 1.0).abs() < 1e-6);
        assert!(pulse(1.0).abs() < 1e-6);
    }
}
