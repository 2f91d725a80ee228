use bevy::math::Vec3;

use super::common;
use crate::camera::{CameraState, Easing};
use crate::layout::{Axis, BlockRef, CellIdx, ModelLayout, Span, Split};
use crate::render::palette;
use crate::walkthrough::engine::{PhaseFrame, PhaseHandler};
use crate::walkthrough::overlay::FrameOverlay;
use crate::walkthrough::timeline::PhaseScript;
use crate::walkthrough::Phase;

/// Token position walked through in detail.
const EXAMPLE_IDX: usize = 3;
const SPREAD: f32 = 0.5;

pub struct EmbeddingPhase;

impl EmbeddingPhase {
    fn example_idx(layout: &ModelLayout) -> usize {
        EXAMPLE_IDX.min(layout.shape.seq_len - 1)
    }
}

impl PhaseHandler for EmbeddingPhase {
    fn phase(&self) -> Phase {
        Phase::Embedding
    }

    fn script(&self, layout: &ModelLayout) -> PhaseScript {
        let emb = &layout.embedding;
        let focus = common::camera_on(
            layout,
            &[emb.tokens, emb.tok_embed, emb.pos_embed, emb.residual],
            -10.0,
            12.0,
        );

        let mut s = PhaseScript::builder(CameraState::overview(layout));
        s.commentary(
            "Each input token is turned into a column of numbers. We follow a single token \
             through this step.",
        )
        .window("move_camera", 1.0)
        .camera_move("move_camera", focus, Easing::Smooth)
        .window("split", 0.3)
        .break_after()
        .commentary(
            "The token's index selects one column of the token embedding matrix. \
             That column is a learned description of the token.",
        )
        .window("fade", 0.3)
        .window("highlight_tok", 0.8)
        .break_after()
        .commentary(
            "Its position in the sequence selects a column of the position embedding matrix \
             in the same way.",
        )
        .window("highlight_pos", 0.8)
        .break_after()
        .commentary(
            "The two columns are added together, cell by cell, to give the token's column \
             of the input embedding.",
        )
        .window("move_tok", 1.0)
        .window("move_pos", 1.0)
        .window("combine", 1.0)
        .window("place", 0.5)
        .window("cleanup_instant", 0.0)
        .window("fade_out", 0.5)
        .cleanup(
            "cleanup_instant",
            &["move_tok", "move_pos", "combine", "place"],
        )
        .cleanup(
            "fade_out",
            &["split", "fade", "highlight_tok", "highlight_pos"],
        )
        .break_after()
        .commentary("Repeating this for every token fills in the whole input embedding.")
        .window("fill_rest", 5.0);
        s.build()
    }

    fn render(&self, frame: &PhaseFrame<'_>, overlay: &mut FrameOverlay) {
        let w = &frame.windows;
        let layout = frame.layout;
        let emb = &layout.embedding;
        let idx = Self::example_idx(layout);

        common::hide_from(frame, overlay, emb.residual);
        let fill = w.get("fill_rest");
        if fill.started() {
            common::process_up_to(frame, overlay, &[emb.residual], fill.t);
            return;
        }

        let split = w.get("split");
        let fade_out = w.get("fade_out");
        let placed = w.get("place").started() || w.get("cleanup_instant").started();

        let res_amount = if fade_out.started() {
            (1.0 - fade_out.eased(Easing::Smooth)) * SPREAD
        } else {
            split.eased(Easing::Smooth) * SPREAD
        };
        let res_col = if split.started() || placed {
            overlay
                .grid
                .split(layout, BlockRef::Base(emb.residual), Axis::X, idx as f32, res_amount)
        } else {
            None
        };
        if let (Some(col), true) = (res_col, placed) {
            overlay.grid.modify(col.focus, |s| s.values_hidden = false);
        }
        if !split.started() {
            return;
        }

        let amount = split.eased(Easing::Smooth) * SPREAD;
        let token = frame.resolver.tokens().get(idx).copied();
        let mut split_at = |id, at: usize| {
            overlay
                .grid
                .split(layout, BlockRef::Base(id), Axis::X, at as f32, amount)
        };
        let tok = split_at(emb.tokens, idx);
        let tok_col = token.and_then(|t| split_at(emb.tok_embed, t));
        let pos_col = split_at(emb.pos_embed, idx);

        let fade = w.get("fade");
        let dim = 1.0 - 0.7 * fade.t;
        for s in [tok, tok_col, pos_col, res_col].into_iter().flatten() {
            for r in [s.before, s.after].into_iter().flatten() {
                overlay.grid.modify(r, |style| style.opacity = dim);
            }
        }

        let ht = w.get("highlight_tok");
        if ht.started() {
            if let Some(tok) = tok {
                overlay.emphasize(tok.focus, ht.t);
            }
            if let Some(col) = tok_col {
                overlay.emphasize(col.focus, ht.t);
            }
            overlay.highlight(
                Span::cell(emb.tokens, CellIdx::new(idx, 0)),
                palette::DEP_SOURCE,
                ht.t,
            );
            overlay.flow(emb.tokens, emb.tok_embed, palette::FLOW, 3);
        }
        let hp = w.get("highlight_pos");
        if let (true, Some(col)) = (hp.started(), pos_col) {
            overlay.emphasize(col.focus, hp.t);
        }

        if let Some(res_col) = res_col {
            self.move_columns(frame, overlay, tok_col, pos_col, res_col);
        }
    }
}

impl EmbeddingPhase {
    /// Copies of the two selected columns travel to the residual column and merge into it.
    fn move_columns(
        &self,
        frame: &PhaseFrame<'_>,
        overlay: &mut FrameOverlay,
        tok_col: Option<Split>,
        pos_col: Option<Split>,
        res_col: Split,
    ) {
        let w = &frame.windows;
        let layout = frame.layout;
        let (mt, mp) = (w.get("move_tok"), w.get("move_pos"));
        let (combine, place) = (w.get("combine"), w.get("place"));
        let Some(target) = overlay.grid.footprint(layout, res_col.focus) else {
            return;
        };
        let gap = Vec3::X * layout.cell * 2.0;

        let mut travel = |source: Option<Split>, moving: f32, stage: Vec3| {
            let source = source?;
            let from = overlay.grid.footprint(layout, source.focus)?.position;
            let dup = overlay.grid.duplicate(layout, source.focus)?;
            let at = from.lerp(stage, Easing::Smooth.apply(moving));
            let at = at.lerp(target.position, combine.eased(Easing::Smooth));
            overlay.grid.modify(dup, |s| {
                s.offset = at - from;
                s.highlight = 1.0;
                s.opacity = 1.0 - combine.t * 0.8;
            });
            Some(dup)
        };
        if mt.started() {
            travel(tok_col, mt.t, target.position - gap);
        }
        if mp.started() {
            travel(pos_col, mp.t, target.position + gap);
        }
        if combine.started() {
            overlay.flow(layout.embedding.tok_embed, layout.embedding.residual, palette::FLOW, 3);
            overlay.flow(layout.embedding.pos_embed, layout.embedding.residual, palette::FLOW, 3);
        }
        if place.started() {
            overlay.emphasize(res_col.focus, common::pulse(place.t));
            let idx = Self::example_idx(layout);
            common::highlight_dependencies(
                frame,
                overlay,
                layout.embedding.residual,
                CellIdx::new(idx, 0),
                common::pulse(place.t),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EXAMPLE_TOKENS;
    use crate::layout::{build_layout, ModelShape};
    use crate::walkthrough::engine::WalkthroughEngine;

    fn window_start(script: &PhaseScript, name: &str) -> f32 {
        script
            .windows()
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.start)
            .unwrap()
    }

    #[test]
    fn example_column_is_revealed_after_placing() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut engine = WalkthroughEngine::default();
        let script = engine.enter(Phase::Embedding, 0, &layout).clone();
        let t = window_start(&script, "fade_out") - 0.01;
        let overlay = engine.render(&layout, &EXAMPLE_TOKENS, t);

        let residual = BlockRef::Base(layout.embedding.residual);
        assert!(overlay.grid.is_shadowed(residual));
        let revealed: Vec<_> = overlay
            .grid
            .drawables(&layout)
            .filter(|(_, fp, style)| fp.root == layout.embedding.residual && !style.values_hidden)
            .collect();
        assert_eq!(revealed.len(), 1);
        assert_eq!(revealed[0].1.origin.x, EXAMPLE_IDX);
    }

    #[test]
    fn token_column_follows_the_token_value() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut engine = WalkthroughEngine::default();
        let script = engine.enter(Phase::Embedding, 0, &layout).clone();
        let t = window_start(&script, "highlight_tok") + 0.5;
        let overlay = engine.render(&layout, &EXAMPLE_TOKENS, t);

        let token = EXAMPLE_TOKENS[EXAMPLE_IDX];
        let lit = overlay
            .grid
            .drawables(&layout)
            .filter(|(_, fp, s)| fp.root == layout.embedding.tok_embed && s.highlight > 0.0)
            .map(|(_, fp, _)| fp.origin.x)
            .collect::<Vec<_>>();
        assert_eq!(lit, vec![token]);
    }

    #[test]
    fn embedding_is_fully_visible_at_the_end() {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let mut engine = WalkthroughEngine::default();
        let length = engine.enter(Phase::Embedding, 0, &layout).length();
        let overlay = engine.render(&layout, &EXAMPLE_TOKENS, length);
        assert!(overlay.grid.transients().is_empty());
        assert!(!overlay
            .grid
            .style(BlockRef::Base(layout.embedding.residual))
            .values_hidden);
    }
}
