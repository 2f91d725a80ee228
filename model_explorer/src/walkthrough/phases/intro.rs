use super::common;
use crate::camera::{CameraState, Easing};
use crate::layout::{Axis, BlockId, BlockKind, BlockRef, CellIdx, ModelLayout, Span};
use crate::render::palette;
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

pub struct IntroPhase;

impl PhaseHandler for IntroPhase {
    fn phase(&self) -> Phase {
        Phase::Intro
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let overview = CameraState::overview(layout);
        let top = common::camera_on(layout, &[layout.embedding.residual], -15.0, 12.0);
        let bottom = common::camera_on(layout, &[layout.output.probs], -15.0, 12.0);
        let turned = CameraState {
            yaw: overview.yaw + 50.0,
            ..overview
        };

        let mut s = PhaseScript::builder(overview);
        s.commentary(
            "This is a tiny GPT style language model. Every block is a tensor: blue blocks \
             are learned weights, green blocks are values computed from them, amber blocks \
             are small helper aggregates.",
        )
        .window_held("overview", 2.0, 0.5)
        .break_after()
        .commentary(
            "Data flows from the top to the bottom: tokens go in, are embedded, pass through \
             a stack of transformer blocks and come out as next-token probabilities.",
        )
        .window("to_top", 1.0)
        .camera_move("to_top", top, Easing::Smooth)
        .window("sweep", 5.0)
        .camera_move("sweep", bottom, Easing::Linear)
        .break_after()
        .commentary("Drag to look around, or press play to step through it one part at a time.")
        .window("spin", 3.0)
        .camera_move("spin", turned, Easing::Smooth);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layout = frame.layout;

        let overview = w.get("overview");
        if overview.active {
            for blk in layout.blocks() {
                overlay.grid.modify(BlockRef::Base(blk.id), |s| s.opacity = overview.t.max(0.2));
            }
        }

        let sweep = w.get("sweep");
        if sweep.started() {
            let order = layout.compute_order();
            overlay.hide_values(order);
            if let Some(i) = common::sweep(overlay, order, sweep.t) {
                common::flow_into(frame, overlay, order[i]);
            }
        }
    }
}

pub struct PrelimPhase;

fn weight_blocks(layout: &ModelLayout) -> Vec<BlockId> {
    layout
        .weights()
        .filter(|b| b.id != layout.embedding.tokens)
        .map(|b| b.id)
        .collect()
}

impl PhaseHandler for PrelimPhase {
    fn phase(&self) -> Phase {
        Phase::Prelim
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let emb = &layout.embedding;
        let tokens = common::camera_on(layout, &[emb.tokens, emb.tok_embed], -5.0, 8.0);

        let mut s = PhaseScript::builder(CameraState::overview(layout));
        s.commentary(
            "The model's job here is to sort a short sequence of letters. The input is a list \
             of tokens, each a number standing for one letter of a three letter vocabulary.",
        )
        .window("to_tokens", 1.0)
        .camera_move("to_tokens", tokens, Easing::Smooth)
        .window("tokens", 2.0)
        .break_after()
        .commentary(
            "Everything the model knows is stored in its weights. Training picked their values; \
             here they are fixed and we only run the model forward.",
        )
        .window("to_weights", 1.0)
        .camera_move("to_weights", CameraState::overview(layout), Easing::Smooth)
        .window_held("weights", 2.0, 0.5)
        .break_after()
        .commentary(
            "Hover any cell to see its value and how it was computed.",
        )
        .window("computed", 2.0);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layout = frame.layout;
        let tokens = layout.embedding.tokens;

        let tok = w.get("tokens");
        if tok.active {
            let t_len = layout.block(tokens).extent(Axis::X);
            let lit = ((tok.t * t_len as f32) as usize).min(t_len - 1);
            overlay.highlight(
                Span::cell(tokens, CellIdx::new(lit, 0)),
                palette::DEP_TARGET,
                1.0,
            );
            overlay.emphasize(BlockRef::Base(tokens), 0.5);
        }

        let weights = w.get("weights");
        if weights.active {
            let ids = weight_blocks(layout);
            let n = ids.len().max(1) as f32;
            for (i, id) in ids.into_iter().enumerate() {
                let local = (weights.t * 2.0 - i as f32 / n).clamp(0.0, 1.0);
                overlay.emphasize(BlockRef::Base(id), common::pulse(local));
            }
        }

        let computed = w.get("computed");
        if computed.started() {
            for blk in layout.blocks().iter().filter(|b| b.kind != BlockKind::Weight) {
                overlay.emphasize(BlockRef::Base(blk.id), common::pulse(computed.t) * 0.6);
            }
        }
    }
}
