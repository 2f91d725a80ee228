//! Turns a [`ModelShape`] into the positioned block graph.
//!
//! Blocks are laid out in rows that stack downward. Within a row the main activation starts at
//! x = 0, weights extend to the left and aggregates to the right; attention heads occupy their own
//! lane along -Z. Rows are separated by the block margin, so two blocks never share volume.

use bevy::math::Vec3;

use super::{
    Axis, AxisSpec, Block, BlockId, BlockKind, DimStyle, EmbeddingBlocks, HeadBlocks,
    LayerBlocks, LayerNormBlocks, ModelLayout, ModelShape, OutputBlocks, Stage, BLOCK_MARGIN,
    CELL_SIZE,
};
use crate::error::ConfigError;

/// Per-block recipe the resolver turns into a dependency descriptor.
///
/// Aggregates reduce `input` along `along`; the aggregate cell for an input cell is the input
/// cell with the `along` coordinate set to zero.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DepRule {
    Stored,
    EmbeddingSum {
        tokens: BlockId,
        tok_embed: BlockId,
        pos_embed: BlockId,
    },
    Mean {
        input: BlockId,
    },
    Variance {
        input: BlockId,
        mean: BlockId,
    },
    Normalize {
        input: BlockId,
        mean: BlockId,
        var: BlockId,
        gamma: BlockId,
        beta: BlockId,
    },
    /// `out[t, j] = sum_k weight[k, j] * concat(inputs)[t, k] + bias[j]`
    Linear {
        weight: BlockId,
        bias: Option<BlockId>,
        inputs: Vec<BlockId>,
    },
    /// Attention scores, x = key, y = query.
    Scores {
        q: BlockId,
        k: BlockId,
    },
    RowMax {
        input: BlockId,
        along: Axis,
        causal: bool,
    },
    RowSumExp {
        input: BlockId,
        max: BlockId,
        along: Axis,
        causal: bool,
    },
    Softmax {
        input: BlockId,
        max: BlockId,
        sumexp: BlockId,
        along: Axis,
        causal: bool,
    },
    Attend {
        probs: BlockId,
        v: BlockId,
    },
    Gelu {
        input: BlockId,
    },
    Residual {
        a: BlockId,
        b: BlockId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Left,
    Main,
    Right,
}

type RowEntry = (BlockId, Slot, usize);

struct LayoutBuilder {
    shape: ModelShape,
    blocks: Vec<Block>,
    compute_order: Vec<BlockId>,
    cursor_y: f32,
    stage: Stage,
    layer: Option<usize>,
    head: Option<usize>,
}

/// Builds the full block graph. Pure: the same shape always yields the same layout.
pub fn build_layout(shape: &ModelShape) -> Result<ModelLayout, ConfigError> {
    shape.validate()?;
    let mut builder = LayoutBuilder::new(*shape);

    let embedding = builder.embedding();
    let mut input = embedding.residual;
    let mut layers = Vec::with_capacity(shape.layers);
    for index in 0..shape.layers {
        let layer = builder.layer(index, input);
        input = layer.mlp_residual;
        layers.push(layer);
    }
    let output = builder.output(input);

    Ok(builder.finish(embedding, layers, output))
}

impl LayoutBuilder {
    fn new(shape: ModelShape) -> Self {
        Self {
            shape,
            blocks: Vec::new(),
            compute_order: Vec::new(),
            cursor_y: 0.0,
            stage: Stage::Embedding,
            layer: None,
            head: None,
        }
    }

    fn time(&self) -> AxisSpec {
        AxisSpec::new(DimStyle::Time, self.shape.seq_len)
    }

    fn channels(&self) -> AxisSpec {
        AxisSpec::new(DimStyle::Channel, self.shape.channels)
    }

    fn push(
        &mut self,
        name: String,
        kind: BlockKind,
        x: AxisSpec,
        y: AxisSpec,
        rule: DepRule,
    ) -> BlockId {
        let id = BlockId(self.blocks.len());
        let axes = [x, y, AxisSpec::UNIT];
        let size = Vec3::new(
            x.extent as f32 * CELL_SIZE,
            y.extent as f32 * CELL_SIZE,
            CELL_SIZE,
        );
        if rule != DepRule::Stored {
            self.compute_order.push(id);
        }
        self.blocks.push(Block {
            id,
            name,
            kind,
            axes,
            position: Vec3::ZERO,
            size,
            stage: self.stage,
            layer: self.layer,
            head: self.head,
            rule,
        });
        id
    }

    fn weight(&mut self, name: String, x: AxisSpec, y: AxisSpec) -> BlockId {
        self.push(name, BlockKind::Weight, x, y, DepRule::Stored)
    }

    fn place_row(&mut self, entries: &[RowEntry]) {
        let top = self.cursor_y;
        let lanes = entries.iter().map(|&(_, _, lane)| lane).max().unwrap_or(0);
        let mut height = 0.0f32;

        for lane in 0..=lanes {
            let in_lane = || entries.iter().filter(move |&&(_, _, l)| l == lane);
            debug_assert!(in_lane().filter(|e| e.1 == Slot::Main).count() <= 1);

            let main_width = in_lane()
                .filter(|e| e.1 == Slot::Main)
                .map(|&(id, _, _)| self.blocks[id.0].size.x)
                .fold(0.0, f32::max);
            let mut left = -BLOCK_MARGIN;
            let mut right = main_width + BLOCK_MARGIN;
            let z = -(lane as f32) * (CELL_SIZE + BLOCK_MARGIN);

            for &(id, slot, _) in in_lane() {
                let blk = &mut self.blocks[id.0];
                let x = match slot {
                    Slot::Main => 0.0,
                    Slot::Left => {
                        let x = left - blk.size.x;
                        left = x - BLOCK_MARGIN;
                        x
                    }
                    Slot::Right => {
                        let x = right;
                        right += blk.size.x + BLOCK_MARGIN;
                        x
                    }
                };
                blk.position = Vec3::new(x, top - blk.size.y, z);
                height = height.max(blk.size.y);
            }
        }

        self.cursor_y = top - height - BLOCK_MARGIN;
    }

    fn embedding(&mut self) -> EmbeddingBlocks {
        self.stage = Stage::Embedding;
        let t = self.time();
        let c = self.channels();

        let tokens = self.weight(
            "tokens".into(),
            t,
            AxisSpec::new(DimStyle::Token, 1),
        );
        let tok_embed = self.weight(
            "tok_embed".into(),
            AxisSpec::new(DimStyle::Vocab, self.shape.vocab),
            c,
        );
        let pos_embed = self.weight("pos_embed".into(), t, c);
        let residual = self.push(
            "residual".into(),
            BlockKind::Intermediate,
            t,
            c,
            DepRule::EmbeddingSum {
                tokens,
                tok_embed,
                pos_embed,
            },
        );

        self.place_row(&[(tokens, Slot::Main, 0)]);
        self.place_row(&[
            (residual, Slot::Main, 0),
            (pos_embed, Slot::Left, 0),
            (tok_embed, Slot::Left, 0),
        ]);

        EmbeddingBlocks {
            tokens,
            tok_embed,
            pos_embed,
            residual,
        }
    }

    fn layer_norm(&mut self, prefix: &str, input: BlockId) -> LayerNormBlocks {
        let t = self.time();
        let c = self.channels();

        let mean = self.push(
            format!("{prefix}.mean"),
            BlockKind::Aggregate,
            t,
            AxisSpec::UNIT,
            DepRule::Mean { input },
        );
        let var = self.push(
            format!("{prefix}.var"),
            BlockKind::Aggregate,
            t,
            AxisSpec::UNIT,
            DepRule::Variance { input, mean },
        );
        let gamma = self.weight(format!("{prefix}.gamma"), AxisSpec::UNIT, c);
        let beta = self.weight(format!("{prefix}.beta"), AxisSpec::UNIT, c);
        let out = self.push(
            format!("{prefix}.out"),
            BlockKind::Intermediate,
            t,
            c,
            DepRule::Normalize {
                input,
                mean,
                var,
                gamma,
                beta,
            },
        );

        self.place_row(&[(mean, Slot::Main, 0)]);
        self.place_row(&[(var, Slot::Main, 0)]);
        self.place_row(&[
            (out, Slot::Main, 0),
            (gamma, Slot::Left, 0),
            (beta, Slot::Left, 0),
        ]);

        LayerNormBlocks {
            mean,
            var,
            gamma,
            beta,
            out,
        }
    }

    fn head(&mut self, prefix: &str, input: BlockId) -> HeadBlocks {
        let t = self.time();
        let c = self.channels();
        let a = AxisSpec::new(DimStyle::HeadWidth, self.shape.head_width);

        let projection = |b: &mut Self, name: &str| {
            let weight = b.weight(format!("{prefix}.{name}_weight"), c, a);
            let bias = b.weight(format!("{prefix}.{name}_bias"), AxisSpec::UNIT, a);
            let out = b.push(
                format!("{prefix}.{name}"),
                BlockKind::Intermediate,
                t,
                a,
                DepRule::Linear {
                    weight,
                    bias: Some(bias),
                    inputs: vec![input],
                },
            );
            (weight, bias, out)
        };
        let (q_weight, q_bias, q) = projection(self, "q");
        let (k_weight, k_bias, k) = projection(self, "k");
        let (v_weight, v_bias, v) = projection(self, "v");

        let attn = self.push(
            format!("{prefix}.attn"),
            BlockKind::Intermediate,
            t,
            t,
            DepRule::Scores { q, k },
        );
        let attn_max = self.push(
            format!("{prefix}.attn_max"),
            BlockKind::Aggregate,
            AxisSpec::UNIT,
            t,
            DepRule::RowMax {
                input: attn,
                along: Axis::X,
                causal: true,
            },
        );
        let attn_sumexp = self.push(
            format!("{prefix}.attn_sumexp"),
            BlockKind::Aggregate,
            AxisSpec::UNIT,
            t,
            DepRule::RowSumExp {
                input: attn,
                max: attn_max,
                along: Axis::X,
                causal: true,
            },
        );
        let attn_softmax = self.push(
            format!("{prefix}.attn_softmax"),
            BlockKind::Intermediate,
            t,
            t,
            DepRule::Softmax {
                input: attn,
                max: attn_max,
                sumexp: attn_sumexp,
                along: Axis::X,
                causal: true,
            },
        );
        let v_out = self.push(
            format!("{prefix}.v_out"),
            BlockKind::Intermediate,
            t,
            a,
            DepRule::Attend {
                probs: attn_softmax,
                v,
            },
        );

        HeadBlocks {
            q_weight,
            q_bias,
            k_weight,
            k_bias,
            v_weight,
            v_bias,
            q,
            k,
            v,
            attn,
            attn_max,
            attn_sumexp,
            attn_softmax,
            v_out,
        }
    }

    fn place_heads(&mut self, heads: &[HeadBlocks]) {
        let rows: [fn(&HeadBlocks) -> Vec<(BlockId, Slot)>; 6] = [
            |h| vec![(h.q, Slot::Main), (h.q_bias, Slot::Left), (h.q_weight, Slot::Left)],
            |h| vec![(h.k, Slot::Main), (h.k_bias, Slot::Left), (h.k_weight, Slot::Left)],
            |h| vec![(h.v, Slot::Main), (h.v_bias, Slot::Left), (h.v_weight, Slot::Left)],
            |h| {
                vec![
                    (h.attn, Slot::Main),
                    (h.attn_max, Slot::Right),
                    (h.attn_sumexp, Slot::Right),
                ]
            },
            |h| vec![(h.attn_softmax, Slot::Main)],
            |h| vec![(h.v_out, Slot::Main)],
        ];
        for row in rows {
            let entries: Vec<RowEntry> = heads
                .iter()
                .enumerate()
                .flat_map(|(lane, head)| {
                    row(head)
                        .into_iter()
                        .map(move |(id, slot)| (id, slot, lane))
                })
                .collect();
            self.place_row(&entries);
        }
    }

    fn layer(&mut self, index: usize, input: BlockId) -> LayerBlocks {
        self.layer = Some(index);
        self.stage = Stage::Attention;
        let origin_y = self.cursor_y;
        let prefix = format!("layer{index}");
        let t = self.time();
        let c = self.channels();
        let hidden = AxisSpec::new(DimStyle::Hidden, self.shape.mlp_width());

        let ln1 = self.layer_norm(&format!("{prefix}.ln1"), input);

        let mut heads = Vec::with_capacity(self.shape.heads);
        for h in 0..self.shape.heads {
            self.head = Some(h);
            heads.push(self.head(&format!("{prefix}.head{h}"), ln1.out));
        }
        self.head = None;
        self.place_heads(&heads);

        let proj_weight = self.weight(format!("{prefix}.proj_weight"), c, c);
        let proj_bias = self.weight(format!("{prefix}.proj_bias"), AxisSpec::UNIT, c);
        let attn_out = self.push(
            format!("{prefix}.attn_out"),
            BlockKind::Intermediate,
            t,
            c,
            DepRule::Linear {
                weight: proj_weight,
                bias: Some(proj_bias),
                inputs: heads.iter().map(|h| h.v_out).collect(),
            },
        );
        let attn_residual = self.push(
            format!("{prefix}.attn_residual"),
            BlockKind::Intermediate,
            t,
            c,
            DepRule::Residual {
                a: input,
                b: attn_out,
            },
        );
        self.place_row(&[
            (attn_out, Slot::Main, 0),
            (proj_bias, Slot::Left, 0),
            (proj_weight, Slot::Left, 0),
        ]);
        self.place_row(&[(attn_residual, Slot::Main, 0)]);

        self.stage = Stage::Mlp;
        let ln2 = self.layer_norm(&format!("{prefix}.ln2"), attn_residual);

        let fc_weight = self.weight(format!("{prefix}.fc_weight"), c, hidden);
        let fc_bias = self.weight(format!("{prefix}.fc_bias"), AxisSpec::UNIT, hidden);
        let fc = self.push(
            format!("{prefix}.fc"),
            BlockKind::Intermediate,
            t,
            hidden,
            DepRule::Linear {
                weight: fc_weight,
                bias: Some(fc_bias),
                inputs: vec![ln2.out],
            },
        );
        let gelu = self.push(
            format!("{prefix}.gelu"),
            BlockKind::Intermediate,
            t,
            hidden,
            DepRule::Gelu { input: fc },
        );
        let mlp_proj_weight = self.weight(format!("{prefix}.mlp_proj_weight"), hidden, c);
        let mlp_proj_bias = self.weight(format!("{prefix}.mlp_proj_bias"), AxisSpec::UNIT, c);
        let mlp_out = self.push(
            format!("{prefix}.mlp_out"),
            BlockKind::Intermediate,
            t,
            c,
            DepRule::Linear {
                weight: mlp_proj_weight,
                bias: Some(mlp_proj_bias),
                inputs: vec![gelu],
            },
        );
        let mlp_residual = self.push(
            format!("{prefix}.mlp_residual"),
            BlockKind::Intermediate,
            t,
            c,
            DepRule::Residual {
                a: attn_residual,
                b: mlp_out,
            },
        );
        self.place_row(&[
            (fc, Slot::Main, 0),
            (fc_bias, Slot::Left, 0),
            (fc_weight, Slot::Left, 0),
        ]);
        self.place_row(&[(gelu, Slot::Main, 0)]);
        self.place_row(&[
            (mlp_out, Slot::Main, 0),
            (mlp_proj_bias, Slot::Left, 0),
            (mlp_proj_weight, Slot::Left, 0),
        ]);
        self.place_row(&[(mlp_residual, Slot::Main, 0)]);
        self.layer = None;

        LayerBlocks {
            index,
            origin_y,
            input,
            ln1,
            heads,
            proj_weight,
            proj_bias,
            attn_out,
            attn_residual,
            ln2,
            fc_weight,
            fc_bias,
            fc,
            gelu,
            mlp_proj_weight,
            mlp_proj_bias,
            mlp_out,
            mlp_residual,
        }
    }

    fn output(&mut self, input: BlockId) -> OutputBlocks {
        self.stage = Stage::Output;
        let t = self.time();
        let c = self.channels();
        let vocab = AxisSpec::new(DimStyle::Vocab, self.shape.vocab);

        let ln = self.layer_norm("ln_f", input);
        let lm_head = self.weight("lm_head".into(), c, vocab);
        let logits = self.push(
            "logits".into(),
            BlockKind::Intermediate,
            t,
            vocab,
            DepRule::Linear {
                weight: lm_head,
                bias: None,
                inputs: vec![ln.out],
            },
        );
        let logits_max = self.push(
            "logits_max".into(),
            BlockKind::Aggregate,
            t,
            AxisSpec::UNIT,
            DepRule::RowMax {
                input: logits,
                along: Axis::Y,
                causal: false,
            },
        );
        let logits_sumexp = self.push(
            "logits_sumexp".into(),
            BlockKind::Aggregate,
            t,
            AxisSpec::UNIT,
            DepRule::RowSumExp {
                input: logits,
                max: logits_max,
                along: Axis::Y,
                causal: false,
            },
        );
        let probs = self.push(
            "probs".into(),
            BlockKind::Intermediate,
            t,
            vocab,
            DepRule::Softmax {
                input: logits,
                max: logits_max,
                sumexp: logits_sumexp,
                along: Axis::Y,
                causal: false,
            },
        );

        self.place_row(&[(logits, Slot::Main, 0), (lm_head, Slot::Left, 0)]);
        self.place_row(&[(logits_max, Slot::Main, 0)]);
        self.place_row(&[(logits_sumexp, Slot::Main, 0)]);
        self.place_row(&[(probs, Slot::Main, 0)]);

        OutputBlocks {
            ln,
            lm_head,
            logits,
            logits_max,
            logits_sumexp,
            probs,
        }
    }

    fn finish(
        self,
        embedding: EmbeddingBlocks,
        layers: Vec<LayerBlocks>,
        output: OutputBlocks,
    ) -> ModelLayout {
        let mut bounds_min = Vec3::splat(f32::MAX);
        let mut bounds_max = Vec3::splat(f32::MIN);
        for blk in &self.blocks {
            bounds_min = bounds_min.min(blk.position);
            bounds_max = bounds_max.max(blk.max());
        }

        ModelLayout {
            shape: self.shape,
            cell: CELL_SIZE,
            margin: BLOCK_MARGIN,
            blocks: self.blocks,
            embedding,
            layers,
            output,
            compute_order: self.compute_order,
            bounds_min,
            bounds_max,
        }
    }
}
