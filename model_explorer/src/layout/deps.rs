//! Per-cell dependency descriptors: which operation produced a cell, and from which cells.
//!
//! Every block carries a [`DepRule`] computed at layout time, so resolving a cell is a single
//! match with no searching.

use super::{Axis, BlockId, CellIdx, DepRule, ModelLayout};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub block: BlockId,
    pub cell: CellIdx,
}

impl CellRef {
    pub fn new(block: BlockId, cell: CellIdx) -> Self {
        Self { block, cell }
    }
}

/// A straight run of cells along one axis of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub block: BlockId,
    pub start: CellIdx,
    pub axis: Axis,
    pub len: usize,
}

impl Span {
    pub fn cell(block: BlockId, cell: CellIdx) -> Self {
        Self {
            block,
            start: cell,
            axis: Axis::X,
            len: 1,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = CellIdx> + '_ {
        (0..self.len).map(move |i| self.start.offset(self.axis, i))
    }

    pub fn contains(&self, cell: CellIdx) -> bool {
        self.cells().any(|c| c == cell)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialOp {
    EmbeddingLookup,
    LayerNormMean,
    LayerNormVariance,
    LayerNorm,
    SoftmaxMax,
    SoftmaxSumExp,
    Softmax,
    SelfAttention,
    Gelu,
}

impl SpecialOp {
    pub fn label(self) -> &'static str {
        match self {
            SpecialOp::EmbeddingLookup => "embedding lookup",
            SpecialOp::LayerNormMean => "layer norm: mean",
            SpecialOp::LayerNormVariance => "layer norm: variance",
            SpecialOp::LayerNorm => "layer norm: normalize",
            SpecialOp::SoftmaxMax => "softmax: row max",
            SpecialOp::SoftmaxSumExp => "softmax: sum of exp",
            SpecialOp::Softmax => "softmax",
            SpecialOp::SelfAttention => "self attention: weighted sum",
            SpecialOp::Gelu => "GELU activation",
        }
    }
}

/// How an embedding cell was selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// Column chosen by the token value stored at `index`.
    Token { index: CellRef, token: usize },
    /// Column chosen by the sequence position.
    Position(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Source {
    pub cell: CellRef,
    pub lookup: Option<Lookup>,
}

impl Source {
    pub fn direct(block: BlockId, cell: CellIdx) -> Self {
        Self {
            cell: CellRef::new(block, cell),
            lookup: None,
        }
    }

    pub fn op(&self) -> Option<SpecialOp> {
        self.lookup.map(|_| SpecialOp::EmbeddingLookup)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Dependency {
    /// `scale * sum_i a[i] * concat(b)[i] + bias`
    Dot {
        a: Span,
        b: Vec<Span>,
        bias: Option<CellRef>,
        scale: f32,
    },
    Add {
        sources: Vec<Source>,
    },
    Special {
        op: SpecialOp,
        sources: Vec<Span>,
    },
}

impl Dependency {
    pub fn operation(&self) -> &'static str {
        match self {
            Dependency::Dot { bias: Some(_), .. } => "dot product + bias",
            Dependency::Dot { .. } => "dot product",
            Dependency::Add { sources } if sources.iter().any(|s| s.lookup.is_some()) => {
                "embedding lookup + add"
            }
            Dependency::Add { .. } => "add",
            Dependency::Special { op, .. } => op.label(),
        }
    }

    /// Every region of source cells the dependency reads.
    pub fn spans(&self) -> Vec<Span> {
        match self {
            Dependency::Dot { a, b, bias, .. } => {
                let mut spans = vec![*a];
                spans.extend(b.iter().copied());
                spans.extend(bias.map(|r| Span::cell(r.block, r.cell)));
                spans
            }
            Dependency::Add { sources } => {
                let mut spans = Vec::with_capacity(sources.len() * 2);
                for source in sources {
                    spans.push(Span::cell(source.cell.block, source.cell.cell));
                    if let Some(Lookup::Token { index, .. }) = source.lookup {
                        spans.push(Span::cell(index.block, index.cell));
                    }
                }
                spans
            }
            Dependency::Special { sources, .. } => sources.clone(),
        }
    }

    /// Distinct source blocks in first-seen order.
    pub fn source_blocks(&self) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = Vec::new();
        for span in self.spans() {
            if !blocks.contains(&span.block) {
                blocks.push(span.block);
            }
        }
        blocks
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CellSource {
    /// Leaf data: weights, embedding tables, input tokens.
    Stored,
    Derived(Dependency),
    /// Excluded by the causal mask; has no value.
    Masked,
    OutOfRange,
}

/// Resolves cells of a layout against the current input tokens.
#[derive(Clone, Copy, Debug)]
pub struct DependencyResolver<'a> {
    layout: &'a ModelLayout,
    tokens: &'a [usize],
}

impl<'a> DependencyResolver<'a> {
    pub fn new(layout: &'a ModelLayout, tokens: &'a [usize]) -> Self {
        Self { layout, tokens }
    }

    pub fn layout(&self) -> &'a ModelLayout {
        self.layout
    }

    pub fn tokens(&self) -> &'a [usize] {
        self.tokens
    }

    /// `None` for leaves, masked cells and out-of-range queries.
    pub fn resolve(&self, block: BlockId, cell: CellIdx) -> Option<Dependency> {
        match self.classify(block, cell) {
            CellSource::Derived(dep) => Some(dep),
            _ => None,
        }
    }

    pub fn classify(&self, block: BlockId, cell: CellIdx) -> CellSource {
        let Some(blk) = self.layout.get(block) else {
            return CellSource::OutOfRange;
        };
        if !blk.contains(cell) {
            return CellSource::OutOfRange;
        }
        let (x, y) = (cell.x, cell.y);

        let dep = match &blk.rule {
            DepRule::Stored => return CellSource::Stored,
            &DepRule::EmbeddingSum {
                tokens,
                tok_embed,
                pos_embed,
            } => {
                let Some(&token) = self.tokens.get(x) else {
                    return CellSource::OutOfRange;
                };
                if token >= self.layout.block(tok_embed).extent(Axis::X) {
                    return CellSource::OutOfRange;
                }
                Dependency::Add {
                    sources: vec![
                        Source {
                            cell: CellRef::new(tok_embed, CellIdx::new(token, y)),
                            lookup: Some(Lookup::Token {
                                index: CellRef::new(tokens, CellIdx::new(x, 0)),
                                token,
                            }),
                        },
                        Source {
                            cell: CellRef::new(pos_embed, CellIdx::new(x, y)),
                            lookup: Some(Lookup::Position(x)),
                        },
                    ],
                }
            }
            &DepRule::Mean { input } => Dependency::Special {
                op: SpecialOp::LayerNormMean,
                sources: vec![self.column(input, x)],
            },
            &DepRule::Variance { input, mean } => Dependency::Special {
                op: SpecialOp::LayerNormVariance,
                sources: vec![
                    self.column(input, x),
                    Span::cell(mean, CellIdx::new(x, 0)),
                ],
            },
            &DepRule::Normalize {
                input,
                mean,
                var,
                gamma,
                beta,
            } => Dependency::Special {
                op: SpecialOp::LayerNorm,
                sources: vec![
                    Span::cell(input, cell),
                    Span::cell(mean, CellIdx::new(x, 0)),
                    Span::cell(var, CellIdx::new(x, 0)),
                    Span::cell(gamma, CellIdx::new(0, y)),
                    Span::cell(beta, CellIdx::new(0, y)),
                ],
            },
            DepRule::Linear {
                weight,
                bias,
                inputs,
            } => Dependency::Dot {
                a: Span {
                    block: *weight,
                    start: CellIdx::new(0, y),
                    axis: Axis::X,
                    len: self.layout.block(*weight).extent(Axis::X),
                },
                b: inputs.iter().map(|&input| self.column(input, x)).collect(),
                bias: bias.map(|b| CellRef::new(b, CellIdx::new(0, y))),
                scale: 1.0,
            },
            &DepRule::Scores { q, k } => {
                if x > y {
                    return CellSource::Masked;
                }
                let width = self.layout.block(q).extent(Axis::Y);
                Dependency::Dot {
                    a: self.column(q, y),
                    b: vec![self.column(k, x)],
                    bias: None,
                    scale: 1.0 / (width as f32).sqrt(),
                }
            }
            &DepRule::RowMax {
                input,
                along,
                causal,
            } => Dependency::Special {
                op: SpecialOp::SoftmaxMax,
                sources: vec![self.reduction(input, cell, along, causal)],
            },
            &DepRule::RowSumExp {
                input,
                max,
                along,
                causal,
            } => Dependency::Special {
                op: SpecialOp::SoftmaxSumExp,
                sources: vec![
                    self.reduction(input, cell, along, causal),
                    Span::cell(max, cell.with(along, 0)),
                ],
            },
            &DepRule::Softmax {
                input,
                max,
                sumexp,
                along,
                causal,
            } => {
                if causal && x > y {
                    return CellSource::Masked;
                }
                Dependency::Special {
                    op: SpecialOp::Softmax,
                    sources: vec![
                        Span::cell(input, cell),
                        Span::cell(max, cell.with(along, 0)),
                        Span::cell(sumexp, cell.with(along, 0)),
                    ],
                }
            }
            &DepRule::Attend { probs, v } => Dependency::Special {
                op: SpecialOp::SelfAttention,
                sources: vec![
                    Span {
                        block: probs,
                        start: CellIdx::new(0, x),
                        axis: Axis::X,
                        len: x + 1,
                    },
                    Span {
                        block: v,
                        start: CellIdx::new(0, y),
                        axis: Axis::X,
                        len: x + 1,
                    },
                ],
            },
            &DepRule::Gelu { input } => Dependency::Special {
                op: SpecialOp::Gelu,
                sources: vec![Span::cell(input, cell)],
            },
            &DepRule::Residual { a, b } => Dependency::Add {
                sources: vec![Source::direct(a, cell), Source::direct(b, cell)],
            },
        };
        CellSource::Derived(dep)
    }

    /// All channels of one time step of a T-wide block.
    fn column(&self, block: BlockId, x: usize) -> Span {
        Span {
            block,
            start: CellIdx::new(x, 0),
            axis: Axis::Y,
            len: self.layout.block(block).extent(Axis::Y),
        }
    }

    /// The input row an aggregate cell reduces over. Causal rows stop at the query position.
    fn reduction(&self, input: BlockId, cell: CellIdx, along: Axis, causal: bool) -> Span {
        let len = if causal {
            let query = match along {
                Axis::X => cell.y,
                _ => cell.x,
            };
            query + 1
        } else {
            self.layout.block(input).extent(along)
        };
        Span {
            block: input,
            start: cell.with(along, 0),
            axis: along,
            len,
        }
    }
}
