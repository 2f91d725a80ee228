use bevy::color::LinearRgba;

use crate::camera::CameraState;
use crate::layout::{BlockId, BlockRef, GridOverlay, ModelLayout, Span};
use crate::particles::FlowPath;

/// A run of cells drawn on top of whatever block currently shows them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpanHighlight {
    pub span: Span,
    pub color: LinearRgba,
    pub strength: f32,
}

/// Everything a phase handler produces for one frame. Rebuilt from scratch every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOverlay {
    pub grid: GridOverlay,
    pub camera: CameraState,
    pub flows: Vec<FlowPath>,
    pub highlights: Vec<SpanHighlight>,
}

impl FrameOverlay {
    pub fn new(layout: &ModelLayout, camera: CameraState) -> Self {
        Self {
            grid: GridOverlay::new(layout),
            camera,
            flows: Vec::new(),
            highlights: Vec::new(),
        }
    }

    pub fn flow(&mut self, from: BlockId, to: BlockId, color: LinearRgba, count: usize) {
        if count > 0 {
            self.flows.push(FlowPath::new(from, to, color, count));
        }
    }

    pub fn highlight(&mut self, span: Span, color: LinearRgba, strength: f32) {
        if strength > 0.0 {
            self.highlights.push(SpanHighlight {
                span,
                color,
                strength: strength.min(1.0),
            });
        }
    }

    pub fn set_opacity(&mut self, ids: &[BlockId], opacity: f32) {
        for &id in ids {
            self.grid
                .modify(BlockRef::Base(id), |s| s.opacity = opacity.clamp(0.0, 1.0));
        }
    }

    pub fn hide_values(&mut self, ids: &[BlockId]) {
        for &id in ids {
            self.grid.modify(BlockRef::Base(id), |s| s.values_hidden = true);
        }
    }

    pub fn emphasize(&mut self, r: BlockRef, amount: f32) {
        self.grid
            .modify(r, |s| s.highlight = s.highlight.max(amount.clamp(0.0, 1.0)));
    }
}
