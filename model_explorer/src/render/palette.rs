//! Colors for blocks, highlights and flows.

use bevy::color::{Alpha, LinearRgba, Mix};

use crate::layout::{BlockKind, BlockStyle};

pub const WEIGHT: LinearRgba = LinearRgba::rgb(0.12, 0.3, 0.85);
pub const INTERMEDIATE: LinearRgba = LinearRgba::rgb(0.15, 0.6, 0.3);
pub const AGGREGATE: LinearRgba = LinearRgba::rgb(0.85, 0.55, 0.1);
const HIDDEN: LinearRgba = LinearRgba::rgb(0.08, 0.08, 0.1);
const EMPHASIS: LinearRgba = LinearRgba::rgb(1.0, 1.0, 1.0);

/// Cell being computed.
pub const DEP_TARGET: LinearRgba = LinearRgba::rgb(1.0, 0.25, 0.2);
/// Cells it reads from.
pub const DEP_SOURCE: LinearRgba = LinearRgba::rgb(0.25, 0.75, 1.0);
pub const MASKED: LinearRgba = LinearRgba::rgb(0.3, 0.3, 0.3);
pub const FLOW: LinearRgba = LinearRgba::rgb(0.4, 0.85, 1.0);
pub const LOSS: LinearRgba = LinearRgba::rgb(1.0, 0.15, 0.4);
pub const GRADIENT: LinearRgba = LinearRgba::rgb(1.0, 0.6, 0.1);

pub fn kind_color(kind: BlockKind) -> LinearRgba {
    match kind {
        BlockKind::Weight => WEIGHT,
        BlockKind::Intermediate => INTERMEDIATE,
        BlockKind::Aggregate => AGGREGATE,
    }
}

/// Final block color: dimmed while values are hidden, pulled toward white by highlight,
/// alpha from opacity.
pub fn block_color(kind: BlockKind, style: &BlockStyle) -> LinearRgba {
    let mut color = kind_color(kind);
    if style.values_hidden {
        color = color.mix(&HIDDEN, 0.75);
    }
    color = color.mix(&EMPHASIS, style.highlight.clamp(0.0, 1.0) * 0.6);
    color.with_alpha(style.opacity.clamp(0.0, 1.0))
}
