//! Static block graph: every tensor of the toy transformer as a positioned cuboid.
//!
//! The layout is built once from a [`ModelShape`] and never mutated afterwards. Animation
//! works on top of it through [`grid::GridOverlay`], which derives transient blocks per frame.

mod builder;
pub mod deps;
pub mod eval;
pub mod grid;
mod shape;

use bevy::math::Vec3;

pub use builder::build_layout;
pub use deps::{CellSource, Dependency, DependencyResolver, Lookup, Source, Span, SpecialOp};
pub use eval::{Evaluator, ValueCache};
pub use grid::{BlockRef, BlockStyle, GridOverlay, Split, TransientBlock};
pub use shape::ModelShape;

pub(crate) use builder::DepRule;

/// Edge length of a single cell in scene units.
pub const CELL_SIZE: f32 = 1.5;
/// Gap between neighbouring blocks in scene units.
pub const BLOCK_MARGIN: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// Semantic meaning of a block axis, used for colouring and tooltips.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DimStyle {
    None,
    Time,
    Channel,
    HeadWidth,
    Hidden,
    Vocab,
    Token,
}

impl DimStyle {
    pub fn label(self) -> &'static str {
        match self {
            DimStyle::None => "",
            DimStyle::Time => "T",
            DimStyle::Channel => "C",
            DimStyle::HeadWidth => "A",
            DimStyle::Hidden => "4C",
            DimStyle::Vocab => "vocab",
            DimStyle::Token => "token",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisSpec {
    pub style: DimStyle,
    pub extent: usize,
}

impl AxisSpec {
    pub const UNIT: AxisSpec = AxisSpec {
        style: DimStyle::None,
        extent: 1,
    };

    pub fn new(style: DimStyle, extent: usize) -> Self {
        Self { style, extent }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Weight,
    Intermediate,
    Aggregate,
}

impl BlockKind {
    pub fn label(self) -> &'static str {
        match self {
            BlockKind::Weight => "weight",
            BlockKind::Intermediate => "intermediate",
            BlockKind::Aggregate => "aggregate",
        }
    }
}

/// Which part of the model a block belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Embedding,
    Attention,
    Mlp,
    Output,
}

/// Integer cell coordinate inside a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIdx {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl CellIdx {
    pub const ZERO: CellIdx = CellIdx { x: 0, y: 0, z: 0 };

    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y, z: 0 }
    }

    pub fn get(self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn with(mut self, axis: Axis, value: usize) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }

    pub fn offset(self, axis: Axis, by: usize) -> Self {
        self.with(axis, self.get(axis) + by)
    }
}

/// A named cuboid of cells: one tensor of the model.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub kind: BlockKind,
    pub axes: [AxisSpec; 3],
    /// Minimum corner in scene space.
    pub position: Vec3,
    pub size: Vec3,
    pub stage: Stage,
    pub layer: Option<usize>,
    pub head: Option<usize>,
    pub(crate) rule: DepRule,
}

impl Block {
    pub fn extent(&self, axis: Axis) -> usize {
        self.axes[axis.index()].extent
    }

    pub fn dim_style(&self, axis: Axis) -> DimStyle {
        self.axes[axis.index()].style
    }

    pub fn cell_count(&self) -> usize {
        self.axes.iter().map(|a| a.extent).product()
    }

    pub fn contains(&self, cell: CellIdx) -> bool {
        Axis::ALL
            .iter()
            .all(|&axis| cell.get(axis) < self.extent(axis))
    }

    pub fn center(&self) -> Vec3 {
        self.position + self.size * 0.5
    }

    pub fn max(&self) -> Vec3 {
        self.position + self.size
    }

    pub fn cell_center(&self, cell: CellIdx) -> Vec3 {
        self.position
            + Vec3::new(
                (cell.x as f32 + 0.5) * CELL_SIZE,
                (cell.y as f32 + 0.5) * CELL_SIZE,
                (cell.z as f32 + 0.5) * CELL_SIZE,
            )
    }

    pub fn is_stored(&self) -> bool {
        matches!(self.rule, DepRule::Stored)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingBlocks {
    pub tokens: BlockId,
    pub tok_embed: BlockId,
    pub pos_embed: BlockId,
    pub residual: BlockId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerNormBlocks {
    pub mean: BlockId,
    pub var: BlockId,
    pub gamma: BlockId,
    pub beta: BlockId,
    pub out: BlockId,
}

impl LayerNormBlocks {
    pub fn all(&self) -> [BlockId; 5] {
        [self.mean, self.var, self.gamma, self.beta, self.out]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeadBlocks {
    pub q_weight: BlockId,
    pub q_bias: BlockId,
    pub k_weight: BlockId,
    pub k_bias: BlockId,
    pub v_weight: BlockId,
    pub v_bias: BlockId,
    pub q: BlockId,
    pub k: BlockId,
    pub v: BlockId,
    pub attn: BlockId,
    pub attn_max: BlockId,
    pub attn_sumexp: BlockId,
    pub attn_softmax: BlockId,
    pub v_out: BlockId,
}

impl HeadBlocks {
    pub fn all(&self) -> [BlockId; 14] {
        [
            self.q_weight,
            self.q_bias,
            self.k_weight,
            self.k_bias,
            self.v_weight,
            self.v_bias,
            self.q,
            self.k,
            self.v,
            self.attn,
            self.attn_max,
            self.attn_sumexp,
            self.attn_softmax,
            self.v_out,
        ]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerBlocks {
    pub index: usize,
    /// Top edge of the layer's first row.
    pub origin_y: f32,
    pub input: BlockId,
    pub ln1: LayerNormBlocks,
    pub heads: Vec<HeadBlocks>,
    pub proj_weight: BlockId,
    pub proj_bias: BlockId,
    pub attn_out: BlockId,
    pub attn_residual: BlockId,
    pub ln2: LayerNormBlocks,
    pub fc_weight: BlockId,
    pub fc_bias: BlockId,
    pub fc: BlockId,
    pub gelu: BlockId,
    pub mlp_proj_weight: BlockId,
    pub mlp_proj_bias: BlockId,
    pub mlp_out: BlockId,
    pub mlp_residual: BlockId,
}

impl LayerBlocks {
    pub fn all(&self) -> Vec<BlockId> {
        let mut ids = self.ln1.all().to_vec();
        for head in &self.heads {
            ids.extend(head.all());
        }
        ids.extend([
            self.proj_weight,
            self.proj_bias,
            self.attn_out,
            self.attn_residual,
        ]);
        ids.extend(self.ln2.all());
        ids.extend([
            self.fc_weight,
            self.fc_bias,
            self.fc,
            self.gelu,
            self.mlp_proj_weight,
            self.mlp_proj_bias,
            self.mlp_out,
            self.mlp_residual,
        ]);
        ids
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputBlocks {
    pub ln: LayerNormBlocks,
    pub lm_head: BlockId,
    pub logits: BlockId,
    pub logits_max: BlockId,
    pub logits_sumexp: BlockId,
    pub probs: BlockId,
}

/// The complete, immutable block graph for one model shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelLayout {
    pub shape: ModelShape,
    pub cell: f32,
    pub margin: f32,
    pub(crate) blocks: Vec<Block>,
    pub embedding: EmbeddingBlocks,
    pub layers: Vec<LayerBlocks>,
    pub output: OutputBlocks,
    /// Derived blocks in forward-computation order.
    pub(crate) compute_order: Vec<BlockId>,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

impl ModelLayout {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().find(|b| b.name == name).map(|b| b.id)
    }

    pub fn compute_order(&self) -> &[BlockId] {
        &self.compute_order
    }

    /// Derived blocks from `from` through `to` (inclusive) in computation order.
    pub fn compute_range(&self, from: BlockId, to: BlockId) -> &[BlockId] {
        let start = self.compute_order.iter().position(|&id| id == from);
        let end = self.compute_order.iter().position(|&id| id == to);
        match (start, end) {
            (Some(s), Some(e)) if s <= e => &self.compute_order[s..=e],
            _ => &[],
        }
    }

    pub fn weights(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.kind == BlockKind::Weight)
    }

    pub fn parameter_count(&self) -> usize {
        self.weights()
            .filter(|b| b.id != self.embedding.tokens)
            .map(Block::cell_count)
            .sum()
    }

    pub fn center(&self) -> Vec3 {
        (self.bounds_min + self.bounds_max) * 0.5
    }

    /// Center of the union of the given blocks' bounding boxes.
    pub fn blocks_center(&self, ids: &[BlockId]) -> Vec3 {
        let (min, max) = self.blocks_bounds(ids);
        (min + max) * 0.5
    }

    pub fn blocks_bounds(&self, ids: &[BlockId]) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for &id in ids {
            let blk = self.block(id);
            min = min.min(blk.position);
            max = max.max(blk.max());
        }
        if ids.is_empty() {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        (min, max)
    }
}
