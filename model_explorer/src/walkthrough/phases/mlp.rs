use super::common;
use crate::camera::Easing;
use crate::layout::{BlockId, ModelLayout};
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

const TARGET_IDX: usize = 3;

pub struct MlpPhase;

fn mlp_blocks(layout: &ModelLayout) -> Vec<BlockId> {
    let layer = &layout.layers[0];
    let mut ids = layer.ln2.all().to_vec();
    ids.extend([
        layer.attn_residual,
        layer.fc_weight,
        layer.fc_bias,
        layer.fc,
        layer.gelu,
        layer.mlp_proj_weight,
        layer.mlp_proj_bias,
        layer.mlp_out,
        layer.mlp_residual,
    ]);
    ids
}

impl PhaseHandler for MlpPhase {
    fn phase(&self) -> Phase {
        Phase::Mlp
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let layer = &layout.layers[0];
        let start = common::camera_on(layout, &[layer.attn_out, layer.attn_residual], -20.0, 12.0);
        let region = common::camera_on(layout, &mlp_blocks(layout), -25.0, 12.0);

        let mut s = PhaseScript::builder(start);
        s.commentary(
            "The second half of the block is the MLP, a small two layer neural network applied \
             to each column on its own. Its input is layer normalized first.",
        )
        .window("move_camera", 1.0)
        .camera_move("move_camera", region, Easing::Smooth)
        .window("ln2", 2.0)
        .break_after()
        .commentary("We follow a single column through it.")
        .window("fade_out", 1.0)
        .break_after()
        .commentary(
            "A matrix multiply with a bias expands the column to four times its length.",
        )
        .window("fc_col", 3.0)
        .break_after()
        .commentary(
            "The GELU activation is applied to each value. It behaves like max(0, x) with a \
             smooth corner, and is where the network gets its non-linearity.",
        )
        .window("gelu_col", 3.0)
        .break_after()
        .commentary("A second matrix multiply with a bias projects it back to length C.")
        .window("proj_col", 3.0)
        .break_after()
        .commentary("As after attention, the result is added to the block's input.")
        .window("resid_col", 3.0)
        .break_after()
        .commentary("Now the same is repeated for every column of the input.")
        .window_held("cleanup", 1.0, 0.5)
        .cleanup("cleanup", &["fade_out"])
        .window("process_all", 6.0);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layout = frame.layout;
        let layer = &layout.layers[0];
        let ln2 = &layer.ln2;
        let idx = TARGET_IDX.min(layout.shape.seq_len - 1);

        common::hide_from(frame, overlay, ln2.mean);
        common::process_up_to(frame, overlay, &[ln2.mean, ln2.var, ln2.out], w.get("ln2").t);

        let others = common::all_except(layout, &mlp_blocks(layout));
        common::fade(overlay, &others, w.get("fade_out").t, 0.15);

        let chain = [layer.fc, layer.gelu, layer.mlp_out, layer.mlp_residual];
        let all = w.get("process_all");
        if all.started() {
            common::process_up_to(frame, overlay, &chain, all.t);
            return;
        }
        let steps = ["fc_col", "gelu_col", "proj_col", "resid_col"];
        for (block, step) in chain.into_iter().zip(steps) {
            let state = w.get(step);
            if state.started() {
                common::process_column(frame, overlay, &[block], idx, state.t);
            }
        }
    }
}
