//! Split and duplicate operations over the immutable layout.
//!
//! A [`GridOverlay`] is rebuilt from scratch every frame. It never touches the base blocks; it
//! only shadows them, styles them, and adds transient pieces that point back at the block that
//! owns their data.

use bevy::math::Vec3;

use super::{Axis, BlockId, CellIdx, ModelLayout};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockRef {
    Base(BlockId),
    Transient(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockStyle {
    /// Displacement from the block's layout position.
    pub offset: Vec3,
    pub opacity: f32,
    pub highlight: f32,
    pub values_hidden: bool,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            offset: Vec3::ZERO,
            opacity: 1.0,
            highlight: 0.0,
            values_hidden: false,
        }
    }
}

/// Where a drawable sits and which cells of which base block it shows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    pub root: BlockId,
    /// First root cell covered.
    pub origin: CellIdx,
    pub cells: [usize; 3],
    pub position: Vec3,
    pub size: Vec3,
}

impl Footprint {
    pub fn cell_size(&self) -> Vec3 {
        self.size
            / Vec3::new(
                self.cells[0].max(1) as f32,
                self.cells[1].max(1) as f32,
                self.cells[2].max(1) as f32,
            )
    }

    pub fn center(&self) -> Vec3 {
        self.position + self.size * 0.5
    }

    /// Root cell under a point inside the footprint.
    pub fn cell_at(&self, point: Vec3) -> CellIdx {
        let local = (point - self.position) / self.cell_size();
        let idx = |axis: Axis| {
            let i = axis.index();
            let v = local[i].floor().max(0.0) as usize;
            v.min(self.cells[i].saturating_sub(1))
        };
        CellIdx {
            x: self.origin.x + idx(Axis::X),
            y: self.origin.y + idx(Axis::Y),
            z: self.origin.z + idx(Axis::Z),
        }
    }

    /// Scene-space box of a run of root cells along `axis`, clipped to this footprint.
    pub fn span_box(&self, start: CellIdx, axis: Axis, len: usize) -> Option<(Vec3, Vec3)> {
        let cell = self.cell_size();
        let mut min = self.position;
        let mut size = cell;
        for a in Axis::ALL {
            let i = a.index();
            let lo = self.origin.get(a);
            let hi = lo + self.cells[i];
            let (from, to) = if a == axis {
                (start.get(a), start.get(a) + len)
            } else {
                (start.get(a), start.get(a) + 1)
            };
            let (from, to) = (from.max(lo), to.min(hi));
            if from >= to {
                return None;
            }
            min[i] += (from - lo) as f32 * cell[i];
            size[i] = (to - from) as f32 * cell[i];
        }
        Some((min, size))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransientKind {
    /// Slice `range` (half-open, parent-local) of the parent along `axis`, split at `slice`.
    Piece {
        axis: Axis,
        slice: f32,
        range: (usize, usize),
    },
    Duplicate,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransientBlock {
    pub parent: BlockRef,
    pub kind: TransientKind,
    pub footprint: Footprint,
    pub style: BlockStyle,
    shadowed: bool,
}

/// The pieces a split produced. `focus` is the slice at the split position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Split {
    pub before: Option<BlockRef>,
    pub focus: BlockRef,
    pub after: Option<BlockRef>,
}

impl Split {
    pub fn pieces(&self) -> impl Iterator<Item = BlockRef> {
        [self.before, Some(self.focus), self.after].into_iter().flatten()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridOverlay {
    base_styles: Vec<BlockStyle>,
    base_shadowed: Vec<bool>,
    transients: Vec<TransientBlock>,
}

impl GridOverlay {
    pub fn new(layout: &ModelLayout) -> Self {
        Self {
            base_styles: vec![BlockStyle::default(); layout.len()],
            base_shadowed: vec![false; layout.len()],
            transients: Vec::new(),
        }
    }

    pub fn transients(&self) -> &[TransientBlock] {
        &self.transients
    }

    pub fn style(&self, r: BlockRef) -> BlockStyle {
        let style = match r {
            BlockRef::Base(id) => self.base_styles.get(id.0).copied(),
            BlockRef::Transient(i) => self.transients.get(i).map(|t| t.style),
        };
        style.unwrap_or_default()
    }

    /// Applies `f` to the style of `r`; unknown references are ignored.
    pub fn modify(&mut self, r: BlockRef, f: impl FnOnce(&mut BlockStyle)) {
        let style = match r {
            BlockRef::Base(id) => self.base_styles.get_mut(id.0),
            BlockRef::Transient(i) => self.transients.get_mut(i).map(|t| &mut t.style),
        };
        if let Some(style) = style {
            f(style);
        }
    }

    pub fn is_shadowed(&self, r: BlockRef) -> bool {
        match r {
            BlockRef::Base(id) => self.base_shadowed.get(id.0).copied().unwrap_or(false),
            BlockRef::Transient(i) => self.transients.get(i).is_some_and(|t| t.shadowed),
        }
    }

    fn shadow(&mut self, r: BlockRef) {
        match r {
            BlockRef::Base(id) => {
                if let Some(s) = self.base_shadowed.get_mut(id.0) {
                    *s = true;
                }
            }
            BlockRef::Transient(i) => {
                if let Some(t) = self.transients.get_mut(i) {
                    t.shadowed = true;
                }
            }
        }
    }

    pub fn footprint(&self, layout: &ModelLayout, r: BlockRef) -> Option<Footprint> {
        match r {
            BlockRef::Base(id) => {
                let blk = layout.get(id)?;
                let style = self.base_styles.get(id.0).copied().unwrap_or_default();
                Some(Footprint {
                    root: id,
                    origin: CellIdx::ZERO,
                    cells: blk.axes.map(|a| a.extent),
                    position: blk.position + style.offset,
                    size: blk.size,
                })
            }
            BlockRef::Transient(i) => {
                let t = self.transients.get(i)?;
                let mut fp = t.footprint;
                fp.position += t.style.offset;
                Some(fp)
            }
        }
    }

    /// Everything that should be drawn this frame.
    pub fn drawables<'a>(
        &'a self,
        layout: &'a ModelLayout,
    ) -> impl Iterator<Item = (BlockRef, Footprint, BlockStyle)> + 'a {
        let base = layout
            .blocks()
            .iter()
            .map(|b| BlockRef::Base(b.id))
            .filter(move |&r| !self.is_shadowed(r));
        let transients = (0..self.transients.len())
            .map(BlockRef::Transient)
            .filter(move |&r| !self.is_shadowed(r));
        base.chain(transients).filter_map(move |r| {
            let fp = self.footprint(layout, r)?;
            Some((r, fp, self.style(r)))
        })
    }

    fn push(&mut self, t: TransientBlock) -> BlockRef {
        self.transients.push(t);
        BlockRef::Transient(self.transients.len() - 1)
    }

    /// Splits `parent` along `axis` at slice `position`, pushing the pieces on either side
    /// `amount` cells away from the focus slice. The parent is shadowed while split; with
    /// `amount == 0` the pieces tile it exactly.
    pub fn split(
        &mut self,
        layout: &ModelLayout,
        parent: BlockRef,
        axis: Axis,
        position: f32,
        amount: f32,
    ) -> Option<Split> {
        let fp = self.footprint(layout, parent)?;
        let a = axis.index();
        let n = fp.cells[a];
        if n == 0 {
            return None;
        }
        let idx = (position.floor().max(0.0) as usize).min(n - 1);
        let cell = fp.size[a] / n as f32;
        let gap = amount.max(0.0) * cell;
        let mut style = self.style(parent);
        style.offset = Vec3::ZERO;

        let piece = |overlay: &mut Self, lo: usize, hi: usize, shift: f32| {
            let mut footprint = fp;
            footprint.origin = fp.origin.offset(axis, lo);
            footprint.cells[a] = hi - lo;
            footprint.position[a] = fp.position[a] + lo as f32 * cell + shift;
            footprint.size[a] = (hi - lo) as f32 * cell;
            overlay.push(TransientBlock {
                parent,
                kind: TransientKind::Piece {
                    axis,
                    slice: position,
                    range: (lo, hi),
                },
                footprint,
                style,
                shadowed: false,
            })
        };

        let before = (idx > 0).then(|| piece(self, 0, idx, -gap));
        let focus = piece(self, idx, idx + 1, 0.0);
        let after = (idx + 1 < n).then(|| piece(self, idx + 1, n, gap));
        self.shadow(parent);

        Some(Split {
            before,
            focus,
            after,
        })
    }

    /// An independent copy of `source` with the same shape and data, drawn in addition to it.
    pub fn duplicate(&mut self, layout: &ModelLayout, source: BlockRef) -> Option<BlockRef> {
        let footprint = self.footprint(layout, source)?;
        let mut style = self.style(source);
        style.offset = Vec3::ZERO;
        Some(self.push(TransientBlock {
            parent: source,
            kind: TransientKind::Duplicate,
            footprint,
            style,
            shadowed: false,
        }))
    }

    /// Pieces split from `parent` along `axis` that overlap the parent-local range `[lo, hi)`.
    pub fn find_sub_blocks(
        &self,
        parent: BlockRef,
        axis: Axis,
        lo: usize,
        hi: usize,
    ) -> Vec<BlockRef> {
        self.transients
            .iter()
            .enumerate()
            .filter(|(_, t)| t.parent == parent)
            .filter_map(|(i, t)| match t.kind {
                TransientKind::Piece {
                    axis: a,
                    range: (from, to),
                    ..
                } if a == axis && from < hi && lo < to => Some(BlockRef::Transient(i)),
                _ => None,
            })
            .collect()
    }
}
