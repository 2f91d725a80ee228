use super::common;
use crate::camera::Easing;
use crate::layout::{Axis, BlockId, BlockRef, CellIdx, ModelLayout, Span};
use crate::render::palette;
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

fn head_region(layout: &ModelLayout) -> Vec<BlockId> {
    let layer = &layout.layers[0];
    let mut ids = vec![layer.ln1.out];
    ids.extend(layer.heads[0].all());
    ids
}

/// Highlights every key/query pair the causal mask removes from `block`.
fn mark_masked(frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay, block: BlockId, strength: f32) {
    let t = frame.layout.shape.seq_len;
    for query in 0..t.saturating_sub(1) {
        let span = Span {
            block,
            start: CellIdx::new(query + 1, query),
            axis: Axis::X,
            len: t - query - 1,
        };
        overlay.highlight(span, palette::MASKED, strength);
    }
}

pub struct SelfAttentionPhase;

impl PhaseHandler for SelfAttentionPhase {
    fn phase(&self) -> Phase {
        Phase::SelfAttention
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let layer = &layout.layers[0];
        let head = &layer.heads[0];
        let start = common::camera_on(layout, &layer.ln1.all(), -15.0, 10.0);
        let qkv = common::camera_on(layout, &head_region(layout), -30.0, 15.0);
        let scores = common::camera_on(layout, &[head.q, head.k, head.attn], -20.0, 10.0);
        let heads: Vec<BlockId> = layer.heads.iter().flat_map(|h| h.all()).collect();
        let all_heads = common::camera_on(layout, &heads, -45.0, 20.0);

        let mut s = PhaseScript::builder(start);
        s.commentary(
            "Self attention lets every column look at the columns before it. Each head first \
             projects the normalized input into query, key and value vectors.",
        )
        .window("move_camera", 1.0)
        .camera_move("move_camera", qkv, Easing::Smooth)
        .break_after()
        .window("qkv", 4.0)
        .break_after()
        .commentary(
            "Every query is compared with every key using a dot product, scaled by one over \
             the square root of the head width.",
        )
        .window("focus_scores", 1.0)
        .camera_move("focus_scores", scores, Easing::Smooth)
        .window("scores", 4.0)
        .break_after()
        .commentary(
            "A token may not look into the future, so scores of later keys are masked out. \
             They are never computed.",
        )
        .window_held("mask", 1.0, 1.0)
        .break_after()
        .commentary(
            "Each head does this independently with its own weights, looking for different \
             relationships between tokens.",
        )
        .window("other_heads", 1.5)
        .camera_move("other_heads", all_heads, Easing::Smooth);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layer = &frame.layout.layers[0];
        let head = &layer.heads[0];

        common::hide_from(frame, overlay, head.q);
        common::process_up_to(frame, overlay, &[head.q, head.k, head.v], w.get("qkv").t);
        common::process_up_to(frame, overlay, &[head.attn], w.get("scores").t);

        let mask = w.get("mask");
        if mask.active {
            mark_masked(frame, overlay, head.attn, mask.eased(Easing::Smooth));
        }

        let others = w.get("other_heads");
        if others.started() {
            for h in layer.heads.iter().skip(1) {
                for id in h.all() {
                    overlay.emphasize(BlockRef::Base(id), common::pulse(others.t));
                }
                common::flow_into(frame, overlay, h.q);
            }
        }
    }
}

pub struct SoftmaxPhase;

impl PhaseHandler for SoftmaxPhase {
    fn phase(&self) -> Phase {
        Phase::Softmax
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let head = &layout.layers[0].heads[0];
        let scores = common::camera_on(layout, &[head.q, head.k, head.attn], -20.0, 10.0);
        let softmax = common::camera_on(
            layout,
            &[head.attn, head.attn_max, head.attn_sumexp, head.attn_softmax],
            -15.0,
            10.0,
        );
        let output = common::camera_on(layout, &[head.v, head.attn_softmax, head.v_out], -20.0, 10.0);

        let mut s = PhaseScript::builder(scores);
        s.commentary(
            "Softmax turns each row of scores into weights that are positive and sum to one: \
             exponentiate every value, then divide by the sum.",
        )
        .window("move_camera", 1.0)
        .camera_move("move_camera", softmax, Easing::Smooth)
        .break_after()
        .commentary(
            "Subtracting the row maximum first keeps the exponentials small without changing \
             the result. The maximum and the sum are kept as per-row aggregates.",
        )
        .window("row_max", 2.0)
        .window("row_sumexp", 2.0)
        .break_after()
        .commentary("With both aggregates each weight is exp(x - max) / sum. Masked cells stay empty.")
        .window("normalize", 3.0)
        .break_after()
        .commentary(
            "The weights then mix the value vectors: each output column is a weighted sum of \
             the value columns it was allowed to see.",
        )
        .window("focus_output", 1.0)
        .camera_move("focus_output", output, Easing::Smooth)
        .window("attend", 4.0);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let head = &frame.layout.layers[0].heads[0];

        common::hide_from(frame, overlay, head.attn_max);
        common::process_up_to(
            frame,
            overlay,
            &[head.attn_max, head.attn_sumexp],
            (w.get("row_max").t + w.get("row_sumexp").t) * 0.5,
        );
        let normalize = w.get("normalize");
        common::process_up_to(frame, overlay, &[head.attn_softmax], normalize.t);
        if normalize.active {
            mark_masked(frame, overlay, head.attn_softmax, 0.6);
        }
        common::process_up_to(frame, overlay, &[head.v_out], w.get("attend").t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EXAMPLE_TOKENS;
    use crate::layout::{build_layout, CellSource, DependencyResolver, ModelShape};
    use crate::walkthrough::engine::WalkthroughEngine;

    #[test]
    fn mask_highlights_cover_exactly_the_masked_cells() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut engine = WalkthroughEngine::default();
        let script = engine.enter(Phase::SelfAttention, 0, &layout).clone();
        let mask = script.windows().iter().find(|w| w.name == "mask").unwrap();
        let overlay = engine.render(&layout, &EXAMPLE_TOKENS, mask.end());

        let attn = layout.layers[0].heads[0].attn;
        let resolver = DependencyResolver::new(&layout, &EXAMPLE_TOKENS);
        let marked: Vec<CellIdx> = overlay
            .highlights
            .iter()
            .filter(|h| h.color == palette::MASKED && h.span.block == attn)
            .flat_map(|h| h.span.cells().collect::<Vec<_>>())
            .collect();
        let t = layout.shape.seq_len;
        assert_eq!(marked.len(), t * (t - 1) / 2);
        for cell in marked {
            assert_eq!(resolver.classify(attn, cell), CellSource::Masked);
        }
    }
}
