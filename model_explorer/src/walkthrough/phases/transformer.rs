use super::common;
use crate::camera::{CameraState, Easing};
use crate::layout::{Axis, BlockId, BlockRef, CellIdx, ModelLayout, Span};
use crate::render::palette;
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

fn layer_range(layout: &ModelLayout) -> &[BlockId] {
    match (layout.layers.first(), layout.layers.last()) {
        (Some(first), Some(last)) => layout.compute_range(first.ln1.mean, last.mlp_residual),
        _ => &[],
    }
}

pub struct TransformerPhase;

impl PhaseHandler for TransformerPhase {
    fn phase(&self) -> Phase {
        Phase::Transformer
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let first = layout.layers[0].all();
        let last = layout.layers[layout.layers.len() - 1].all();
        let start = common::camera_on(layout, &first, -25.0, 12.0);
        let end = common::camera_on(layout, &last, -25.0, 12.0);

        let mut s = PhaseScript::builder(start);
        s.commentary(
            "That was one transformer block. The model stacks several of them, each taking \
             the previous block's output as its input.",
        )
        .window("overview", 1.5)
        .camera_move("overview", CameraState::overview(layout), Easing::Smooth)
        .break_after()
        .commentary(
            "Every block has its own weights but the same structure. The columns flow through \
             them one after another.",
        )
        .window("focus_first", 1.0)
        .camera_move("focus_first", start, Easing::Smooth)
        .window("layer_sweep", 8.0)
        .camera_move("layer_sweep", end, Easing::Linear)
        .break_after()
        .commentary(
            "Earlier blocks tend to pick up simple patterns; later ones combine them into \
             higher level features that help predict the next token.",
        )
        .window_held("repeat", 1.5, 1.0)
        .camera_move("repeat", CameraState::overview(layout), Easing::Smooth);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layout = frame.layout;
        let range = layer_range(layout);
        let Some(&first) = range.first() else {
            return;
        };

        common::hide_from(frame, overlay, first);
        let sweep = w.get("layer_sweep");
        if let Some(i) = common::sweep(overlay, range, sweep.t) {
            common::flow_into(frame, overlay, range[i]);
        }

        let repeat = w.get("repeat");
        if repeat.active {
            let strength = common::pulse(repeat.t);
            for layer in &layout.layers {
                overlay.emphasize(BlockRef::Base(layer.mlp_residual), strength);
                overlay.emphasize(BlockRef::Base(layer.attn_residual), strength);
            }
        }
    }
}

pub struct OutputPhase;

impl PhaseHandler for OutputPhase {
    fn phase(&self) -> Phase {
        Phase::Output
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let out = &layout.output;
        let last = layout.layers[layout.layers.len() - 1].mlp_residual;
        let start = common::camera_on(layout, &[last], -20.0, 10.0);
        let mut region = out.ln.all().to_vec();
        region.extend([out.lm_head, out.logits, out.probs, out.logits_max, out.logits_sumexp]);
        let focus = common::camera_on(layout, &region, -20.0, 10.0);
        let probs = common::camera_on(layout, &[out.logits, out.probs], -10.0, 8.0);

        let mut s = PhaseScript::builder(start);
        s.commentary(
            "After the last block the columns are normalized one final time.",
        )
        .window("move_camera", 1.0)
        .camera_move("move_camera", focus, Easing::Smooth)
        .window("ln_f", 2.0)
        .break_after()
        .commentary(
            "A linear layer maps every column to one score per vocabulary entry. These scores \
             are called logits.",
        )
        .window("logits", 3.0)
        .break_after()
        .commentary(
            "A softmax over each column turns the logits into probabilities for the next token.",
        )
        .window("softmax", 3.0)
        .break_after()
        .commentary(
            "The column of the last token holds the prediction: the most likely entry is the \
             model's guess for what comes next.",
        )
        .window_held("predict", 1.5, 1.0)
        .camera_move("predict", probs, Easing::Smooth);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let out = &frame.layout.output;

        common::hide_from(frame, overlay, out.ln.mean);
        common::process_up_to(frame, overlay, &[out.ln.mean, out.ln.var, out.ln.out], w.get("ln_f").t);
        common::process_up_to(frame, overlay, &[out.logits], w.get("logits").t);
        common::process_up_to(
            frame,
            overlay,
            &[out.logits_max, out.logits_sumexp, out.probs],
            w.get("softmax").t,
        );

        let predict = w.get("predict");
        if predict.active {
            let probs = frame.layout.block(out.probs);
            let last = probs.extent(Axis::X) - 1;
            let span = Span {
                block: out.probs,
                start: CellIdx::new(last, 0),
                axis: Axis::Y,
                len: probs.extent(Axis::Y),
            };
            overlay.highlight(span, palette::DEP_TARGET, predict.eased(Easing::Smooth));
            overlay.emphasize(BlockRef::Base(out.probs), predict.t * 0.5);
        }
    }
}
