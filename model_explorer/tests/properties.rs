use model_explorer::layout::grid::Footprint;
use model_explorer::layout::{
    build_layout, Axis, BlockRef, CellIdx, CellSource, DependencyResolver, GridOverlay,
    ModelShape,
};
use model_explorer::walkthrough::{WindowSpec, WindowState};
use proptest::prelude::*;

fn window() -> impl Strategy<Value = WindowSpec> {
    (0.0f32..10.0, 0.0f32..5.0, 0.0f32..2.0).prop_map(|(start, duration, hold)| WindowSpec {
        name: "w",
        start,
        duration,
        hold,
    })
}

proptest! {
    #[test]
    fn window_progress_is_bounded_and_monotonic(
        spec in window(),
        a in 0.0f32..20.0,
        b in 0.0f32..20.0,
    ) {
        let (early, late) = if a <= b { (a, b) } else { (b, a) };
        let (s0, s1) = (spec.evaluate(early), spec.evaluate(late));

        prop_assert!((0.0..=1.0).contains(&s0.t));
        prop_assert!((0.0..=1.0).contains(&s1.t));
        prop_assert!(s0.t <= s1.t);
        if early < spec.start {
            prop_assert_eq!(s0, WindowState::IDLE);
        }
        if late > spec.end() + spec.hold {
            prop_assert!(!s1.active);
        }
    }

    #[test]
    fn zero_amount_split_tiles_any_parent(
        head in 0usize..3,
        axis_x in any::<bool>(),
        position in 0.0f32..16.0,
    ) {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let id = layout.layers[0].heads[head].q;
        let axis = if axis_x { Axis::X } else { Axis::Y };
        let parent = layout.block(id).clone();
        let mut overlay = GridOverlay::new(&layout);

        let split = overlay
            .split(&layout, BlockRef::Base(id), axis, position, 0.0)
            .unwrap();
        let pieces: Vec<Footprint> = split
            .pieces()
            .map(|r| overlay.footprint(&layout, r).unwrap())
            .collect();

        let a = axis.index();
        let mut cursor = parent.position[a];
        let mut cells = 0;
        for piece in &pieces {
            prop_assert!((piece.position[a] - cursor).abs() < 1e-4);
            cursor += piece.size[a];
            cells += piece.cells[a];
        }
        prop_assert!((cursor - parent.max()[a]).abs() < 1e-3);
        prop_assert_eq!(cells, parent.extent(axis));
    }

    #[test]
    fn attention_is_masked_above_the_diagonal(
        layer in 0usize..3,
        head in 0usize..3,
        key in 0usize..6,
        query in 0usize..6,
    ) {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let tokens = [0, 1, 2, 0, 1, 2];
        let resolver = DependencyResolver::new(&layout, &tokens);
        let attn = layout.layers[layer].heads[head].attn;

        let source = resolver.classify(attn, CellIdx::new(key, query));
        prop_assert_eq!(source == CellSource::Masked, key > query);
    }
}
