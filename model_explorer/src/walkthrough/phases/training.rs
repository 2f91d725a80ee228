use std::f32::consts::PI;

use super::common;
use crate::camera::{CameraState, Easing};
use crate::layout::{Axis, BlockId, BlockKind, BlockRef, CellIdx, ModelLayout, Span};
use crate::render::palette;
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

pub struct TrainingPhase;

fn weight_blocks(layout: &ModelLayout) -> Vec<BlockId> {
    layout
        .weights()
        .filter(|b| b.id != layout.embedding.tokens)
        .map(|b| b.id)
        .collect()
}

impl PhaseHandler for TrainingPhase {
    fn phase(&self) -> Phase {
        Phase::Training
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let top = common::camera_on(layout, &[layout.embedding.residual], -15.0, 12.0);
        let output = common::camera_on(
            layout,
            &[layout.output.logits, layout.output.probs],
            -15.0,
            10.0,
        );
        let weights = common::camera_on(layout, &layout.layers[0].heads[0].all(), -35.0, 15.0);
        let full = CameraState::overview(layout);

        let mut s = PhaseScript::builder(full);
        s.commentary(
            "So far the weights were given. Training is how they are found, in a loop that is \
             repeated many times. First a forward pass makes a prediction for a training example.",
        )
        .window_held("cam_to_top", 1.0, 0.3)
        .camera_move("cam_to_top", top, Easing::Smooth)
        .window_held("forward", 6.0, 0.5)
        .window_held("cam_to_output", 1.0, 0.3)
        .camera_move("cam_to_output", output, Easing::Smooth)
        .break_after()
        .commentary(
            "The prediction is compared with the correct answer. The loss measures how wrong \
             it is.",
        )
        .window_held("loss", 2.0, 0.5)
        .break_after()
        .commentary(
            "Backpropagation then works out how much each weight contributed to the loss, \
             with gradients flowing from the output back to the input.",
        )
        .window_held("backprop", 8.0, 0.5)
        .window_held("cam_back_to_top", 1.0, 0.3)
        .camera_move("cam_back_to_top", top, Easing::Smooth)
        .break_after()
        .commentary("Finally every weight is nudged in the direction that lowers the loss.")
        .window_held("cam_to_weights", 1.0, 0.3)
        .camera_move("cam_to_weights", weights, Easing::Smooth)
        .window_held("update", 4.0, 0.5)
        .break_after()
        .commentary(
            "Repeating the cycle over many examples slowly moves the weights toward values \
             that make good predictions.",
        )
        .window_held("full_view", 1.0, 0.3)
        .camera_move("full_view", full, Easing::Smooth)
        .window_held("cycle", 6.0, 0.5);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;

        let forward = w.get("forward");
        if forward.active {
            self.forward(frame, overlay, forward.t);
        }
        let loss = w.get("loss");
        if loss.active {
            self.loss(frame, overlay, loss.t);
        }
        let backprop = w.get("backprop");
        if backprop.active {
            self.backward(frame, overlay, backprop.t);
        }
        let update = w.get("update");
        if update.active {
            self.update(frame, overlay, update.t);
        }
        let cycle = w.get("cycle");
        if cycle.active {
            let step = (cycle.t * 4.0).min(3.999);
            let local = step.fract();
            match step as usize {
                0 => self.forward(frame, overlay, local),
                1 => self.loss(frame, overlay, local),
                2 => self.backward(frame, overlay, local),
                _ => self.update(frame, overlay, local),
            }
        }
    }
}

impl TrainingPhase {
    fn forward(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, t: f32) {
        let order = frame.layout.compute_order();
        overlay.hide_values(order);
        let reached = common::sweep(overlay, order, t).unwrap_or(order.len());
        for &id in &order[..reached.min(order.len())] {
            overlay.emphasize(BlockRef::Base(id), 0.1);
        }
        if let Some(&current) = order.get(reached) {
            common::flow_into(frame, overlay, current);
        }
    }

    fn loss(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, t: f32) {
        let probs = frame.layout.output.probs;
        let flash = (t * 4.0 * PI).sin() * 0.5 + 0.5;
        overlay.emphasize(BlockRef::Base(probs), 0.3 + flash * 0.4);

        let blk = frame.layout.block(probs);
        let span = Span {
            block: probs,
            start: CellIdx::new(blk.extent(Axis::X) - 1, 0),
            axis: Axis::Y,
            len: blk.extent(Axis::Y),
        };
        overlay.highlight(span, palette::LOSS, flash);
    }

    /// Reverse sweep: the block reached glows, its weights light up and gradient particles flow
    /// back to its sources.
    fn backward(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, t: f32) {
        let order = frame.layout.compute_order();
        let n = order.len();
        if n == 0 {
            return;
        }
        let current = (((1.0 - t.clamp(0.0, 1.0)) * n as f32) as usize).min(n - 1);
        for (i, &id) in order.iter().enumerate().skip(current) {
            let dist = i - current;
            let amount = match dist {
                0 => 0.7,
                1 | 2 => 0.4 - dist as f32 * 0.1,
                _ => 0.05,
            };
            overlay.emphasize(BlockRef::Base(id), amount);
        }

        let id = order[current];
        let glow = 0.3 * common::pulse((t * 3.0).fract());
        common::flash_block(frame, overlay, id, palette::GRADIENT, glow);
        if let Some(dep) = frame.resolver.resolve(id, CellIdx::ZERO) {
            for src in dep.source_blocks() {
                if frame.layout.block(src).kind == BlockKind::Weight {
                    overlay.emphasize(BlockRef::Base(src), 0.5);
                }
                if src != id {
                    overlay.flow(id, src, palette::GRADIENT, 4);
                }
            }
        }
    }

    /// Staggered pulse over every weight block.
    fn update(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, t: f32) {
        for (i, id) in weight_blocks(frame.layout).into_iter().enumerate() {
            let phase = t * 3.0 - i as f32 * 0.1;
            let pulse = (phase * 2.0 * PI).sin().max(0.0);
            overlay.emphasize(BlockRef::Base(id), pulse * 0.6);
            if pulse > 0.5 {
                overlay
                    .grid
                    .modify(BlockRef::Base(id), |s| s.opacity = 0.8 + pulse * 0.2);
            }
        }
    }
}
