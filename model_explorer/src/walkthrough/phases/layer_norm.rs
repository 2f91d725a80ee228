use super::common;
use crate::camera::{CameraState, Easing};
use crate::layout::{Axis, BlockId, BlockRef, CellIdx, ModelLayout, Span};
use crate::render::palette;
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

/// Column normalized step by step before the whole block is run.
const COLUMN: usize = 0;

pub struct LayerNormPhase;

fn focus_blocks(layout: &ModelLayout) -> Vec<BlockId> {
    let layer = &layout.layers[0];
    let mut ids = vec![layer.input];
    ids.extend(layer.ln1.all());
    ids
}

fn column_camera(layout: &ModelLayout) -> CameraState {
    let layer = &layout.layers[0];
    let input = layout.block(layer.input);
    let out = layout.block(layer.ln1.out);
    let c = input.extent(Axis::Y);
    let top = input.cell_center(CellIdx::new(COLUMN, c / 2));
    let bottom = out.cell_center(CellIdx::new(COLUMN, c / 2));
    let extent = (top - bottom).length() + layout.cell * 4.0;
    CameraState::new((top + bottom) * 0.5, -25.0, 8.0, extent * 1.1 / crate::camera::ZOOM_DISTANCE)
}

impl PhaseHandler for LayerNormPhase {
    fn phase(&self) -> Phase {
        Phase::LayerNorm
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let region = common::camera_on(layout, &focus_blocks(layout), -15.0, 10.0);
        let mut s = PhaseScript::builder(common::camera_on(
            layout,
            &[layout.embedding.residual],
            -10.0,
            12.0,
        ));
        s.commentary(
            "Before attention, every column of the input is normalized so that its values \
             have a mean of zero and a variance of one.",
        )
        .window("move_camera", 1.0)
        .camera_move("move_camera", region, Easing::Smooth)
        .window_held("hide_extra", 1.0, 1.0)
        .window("show_input", 1.0)
        .window("camera_close", 0.5)
        .camera_move("camera_close", column_camera(layout), Easing::Smooth)
        .break_after()
        .commentary("The normalization looks at one column at a time.")
        .window("focus_column", 0.5)
        .break_after()
        .commentary(
            "First we compute the mean of the column, then its variance around that mean. \
             Both are stored in small aggregate blocks, one value per column.",
        )
        .window("calc_mean", 0.5)
        .window("calc_var", 0.5)
        .break_after()
        .commentary(
            "Each value is shifted by the mean and divided by the standard deviation, then \
             scaled and offset by the learned weights gamma and beta.",
        )
        .window("clean_aggs", 0.2)
        .cleanup("clean_aggs", &["calc_mean", "calc_var"])
        .window("col_sequence", 2.0)
        .break_after()
        .commentary("The same happens to every other column.")
        .window("cleanup_splits", 0.5)
        .cleanup("cleanup_splits", &["focus_column"])
        .window("run_agg", 2.0)
        .window("run_norm", 6.0);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layout = frame.layout;
        let layer = &layout.layers[0];
        let ln = &layer.ln1;

        common::hide_from(frame, overlay, ln.mean);
        let others = common::all_except(layout, &focus_blocks(layout));
        common::fade(overlay, &others, w.get("hide_extra").t, 0.15);

        let show = w.get("show_input");
        if show.active {
            overlay.emphasize(BlockRef::Base(layer.input), common::pulse(show.t));
        }

        let focus = w.get("focus_column");
        if focus.started() {
            let amount = focus.eased(Easing::Smooth) * 0.5;
            if let Some(col) =
                overlay
                    .grid
                    .split(layout, BlockRef::Base(layer.input), Axis::X, COLUMN as f32, amount)
            {
                overlay.emphasize(col.focus, focus.t * 0.5);
            }
        }

        let run_agg = w.get("run_agg");
        if run_agg.started() {
            common::process_up_to(frame, overlay, &[ln.mean, ln.var], run_agg.t);
        } else {
            let aggs_done = w.get("clean_aggs").started();
            self.aggregate(frame, overlay, ln.mean, w.get("calc_mean").t, aggs_done);
            self.aggregate(frame, overlay, ln.var, w.get("calc_var").t, aggs_done);
        }

        let run_norm = w.get("run_norm");
        if run_norm.started() {
            common::process_up_to(frame, overlay, &[ln.out], run_norm.t);
        } else {
            let col = w.get("col_sequence");
            if col.started() {
                common::process_column(frame, overlay, &[ln.out], COLUMN, col.t);
            }
        }
    }
}

impl LayerNormPhase {
    /// Shows one aggregate cell being computed from the focus column.
    fn aggregate(
        &self,
        frame: &PhaseFrame<'_>,
        overlay: &mut FrameOverlay,
        block: BlockId,
        t: f32,
        done: bool,
    ) {
        if t <= 0.0 && !done {
            return;
        }
        let Some(col) = overlay.grid.split(
            frame.layout,
            BlockRef::Base(block),
            Axis::X,
            COLUMN as f32,
            0.0,
        ) else {
            return;
        };
        overlay.grid.modify(col.focus, |s| s.values_hidden = false);
        if done {
            return;
        }
        overlay.emphasize(col.focus, t);
        let input = frame.layout.layers[0].input;
        let span = Span {
            block: input,
            start: CellIdx::new(COLUMN, 0),
            axis: Axis::Y,
            len: frame.layout.block(input).extent(Axis::Y),
        };
        overlay.highlight(span, palette::DEP_SOURCE, t);
        common::highlight_dependencies(frame, overlay, block, CellIdx::new(COLUMN, 0), t);
        overlay.flow(input, block, palette::FLOW, 4);
    }
}
