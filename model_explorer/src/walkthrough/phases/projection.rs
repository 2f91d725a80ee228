use bevy::math::Vec3;

use super::common;
use crate::camera::Easing;
use crate::layout::{BlockId, BlockRef, ModelLayout};
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

pub struct ProjectionPhase;

fn projection_blocks(layout: &ModelLayout) -> Vec<BlockId> {
    let layer = &layout.layers[0];
    let mut ids: Vec<BlockId> = layer.heads.iter().map(|h| h.v_out).collect();
    ids.extend([
        layer.proj_weight,
        layer.proj_bias,
        layer.attn_out,
        layer.attn_residual,
        layer.input,
    ]);
    ids
}

impl PhaseHandler for ProjectionPhase {
    fn phase(&self) -> Phase {
        Phase::Projection
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let layer = &layout.layers[0];
        let heads: Vec<BlockId> = layer.heads.iter().map(|h| h.v_out).collect();
        let start = common::camera_on(layout, &heads, -40.0, 15.0);
        let close = common::camera_on(
            layout,
            &[layer.heads[0].v_out, layer.proj_weight, layer.attn_out],
            -15.0,
            10.0,
        );
        let wide = common::camera_on(layout, &projection_blocks(layout), -20.0, 12.0);

        let mut s = PhaseScript::builder(start);
        s.commentary(
            "The outputs of all heads are stacked on top of each other into one column of \
             length C per token.",
        )
        .window_held("fade_out", 1.0, 0.5)
        .window("stack", 1.0)
        .camera_move("stack", close, Easing::Smooth)
        .break_after()
        .commentary(
            "A linear projection with a bias mixes the heads back together, one column at \
             a time.",
        )
        .window("process", 3.0)
        .break_after()
        .commentary(
            "The result is added to the input of the block. This residual connection lets \
             information skip past the attention layer.",
        )
        .window_held("zoom_out", 1.0, 0.5)
        .camera_move("zoom_out", wide, Easing::Smooth)
        .cleanup("zoom_out", &["fade_out", "stack"])
        .window("process_resid", 3.0);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layout = frame.layout;
        let layer = &layout.layers[0];

        common::hide_from(frame, overlay, layer.attn_out);
        let others = common::all_except(layout, &projection_blocks(layout));
        common::fade(overlay, &others, w.get("fade_out").t, 0.1);

        let stack = w.get("stack");
        if stack.started() {
            self.stack_heads(frame, overlay, stack.eased(Easing::Smooth));
        }

        common::process_up_to(frame, overlay, &[layer.attn_out], w.get("process").t);
        common::process_up_to(
            frame,
            overlay,
            &[layer.attn_residual],
            w.get("process_resid").t,
        );
    }
}

impl ProjectionPhase {
    /// Copies of every head's output slide into one column stack next to head 0.
    fn stack_heads(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, t: f32) {
        let layout = frame.layout;
        let heads = &layout.layers[0].heads;
        let anchor = layout.block(heads[0].v_out);
        let height = anchor.size.y;
        for (h, head) in heads.iter().enumerate() {
            let blk = layout.block(head.v_out);
            let lift = height * (heads.len() as f32 - 1.0) * 0.5;
            let target = anchor.position
                + Vec3::new(anchor.size.x + layout.margin, lift - h as f32 * height, 0.0);
            let Some(dup) = overlay.grid.duplicate(layout, BlockRef::Base(head.v_out)) else {
                continue;
            };
            overlay.grid.modify(dup, |s| {
                s.offset = (target - blk.position) * t;
                s.highlight = t * 0.5;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EXAMPLE_TOKENS;
    use crate::layout::{build_layout, ModelShape};
    use crate::walkthrough::engine::WalkthroughEngine;

    #[test]
    fn stacked_heads_do_not_overlap_each_other() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut engine = WalkthroughEngine::default();
        let script = engine.enter(Phase::Projection, 0, &layout).clone();
        let stack = script.windows().iter().find(|w| w.name == "stack").unwrap();
        let overlay = engine.render(&layout, &EXAMPLE_TOKENS, stack.end());

        let dups: Vec<_> = (0..overlay.grid.transients().len())
            .filter_map(|i| overlay.grid.footprint(&layout, BlockRef::Transient(i)))
            .collect();
        assert_eq!(dups.len(), layout.shape.heads);
        for pair in dups.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!((a.position.y - (b.position.y + b.size.y)).abs() < 1e-3);
            assert!((a.position.z - b.position.z).abs() < 1e-3);
        }
    }
}
