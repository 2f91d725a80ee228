//! Recursive numeric evaluation of cell values for previews and tooltips.

use std::collections::HashMap;

use super::deps::CellRef;
use super::{
    BlockId, CellIdx, CellSource, Dependency, DependencyResolver, ModelLayout, Span, SpecialOp,
};
use crate::data::ModelWeights;

const LN_EPS: f32 = 1e-5;

/// Memoized cell values. Cleared whenever weights or tokens change.
#[derive(Debug, Default)]
pub struct ValueCache {
    values: HashMap<CellRef, Option<f32>>,
}

impl ValueCache {
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct Evaluator<'a> {
    resolver: DependencyResolver<'a>,
    weights: &'a ModelWeights,
    cache: &'a mut ValueCache,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        layout: &'a ModelLayout,
        weights: &'a ModelWeights,
        cache: &'a mut ValueCache,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(layout, &weights.tokens),
            weights,
            cache,
        }
    }

    /// Value of a cell, or `None` for masked, out-of-range or missing data.
    pub fn value(&mut self, block: BlockId, cell: CellIdx) -> Option<f32> {
        let key = CellRef::new(block, cell);
        if let Some(&cached) = self.cache.values.get(&key) {
            return cached;
        }
        let value = match self.resolver.classify(block, cell) {
            CellSource::Stored => self
                .weights
                .stored(self.resolver.layout().block(block), cell),
            CellSource::Derived(dep) => self.compute(&dep),
            CellSource::Masked | CellSource::OutOfRange => None,
        };
        self.cache.values.insert(key, value);
        value
    }

    fn span_values(&mut self, span: &Span) -> Option<Vec<f32>> {
        span.cells().map(|cell| self.value(span.block, cell)).collect()
    }

    fn scalar(&mut self, span: &Span) -> Option<f32> {
        self.value(span.block, span.start)
    }

    fn compute(&mut self, dep: &Dependency) -> Option<f32> {
        match dep {
            Dependency::Dot { a, b, bias, scale } => {
                let lhs = self.span_values(a)?;
                let mut rhs = Vec::with_capacity(lhs.len());
                for span in b {
                    rhs.extend(self.span_values(span)?);
                }
                if lhs.len() != rhs.len() {
                    return None;
                }
                let dot: f32 = lhs.iter().zip(&rhs).map(|(x, y)| x * y).sum();
                let bias = match bias {
                    Some(r) => self.value(r.block, r.cell)?,
                    None => 0.0,
                };
                Some(dot * scale + bias)
            }
            Dependency::Add { sources } => sources
                .iter()
                .map(|s| self.value(s.cell.block, s.cell.cell))
                .sum(),
            Dependency::Special { op, sources } => self.special(*op, sources),
        }
    }

    fn special(&mut self, op: SpecialOp, sources: &[Span]) -> Option<f32> {
        let first = sources.first()?;
        match op {
            SpecialOp::EmbeddingLookup => self.scalar(first),
            SpecialOp::Gelu => {
                let x = self.scalar(first)?;
                Some(gelu(x))
            }
            SpecialOp::LayerNormMean => {
                let vals = self.span_values(first)?;
                Some(mean(&vals))
            }
            SpecialOp::LayerNormVariance => {
                let vals = self.span_values(first)?;
                let m = self.scalar(sources.get(1)?)?;
                Some(vals.iter().map(|v| (v - m).powi(2)).sum::<f32>() / vals.len() as f32)
            }
            SpecialOp::LayerNorm => {
                let [x, m, var, gamma, beta] = sources else {
                    return None;
                };
                let x = self.scalar(x)?;
                let m = self.scalar(m)?;
                let var = self.scalar(var)?;
                let gamma = self.scalar(gamma)?;
                let beta = self.scalar(beta)?;
                Some((x - m) / (var + LN_EPS).sqrt() * gamma + beta)
            }
            SpecialOp::SoftmaxMax => {
                let vals = self.span_values(first)?;
                vals.into_iter().reduce(f32::max)
            }
            SpecialOp::SoftmaxSumExp => {
                let vals = self.span_values(first)?;
                let max = self.scalar(sources.get(1)?)?;
                Some(vals.iter().map(|v| (v - max).exp()).sum())
            }
            SpecialOp::Softmax => {
                let [x, max, sumexp] = sources else {
                    return None;
                };
                let x = self.scalar(x)?;
                let max = self.scalar(max)?;
                let sumexp = self.scalar(sumexp)?;
                Some((x - max).exp() / sumexp)
            }
            SpecialOp::SelfAttention => {
                let probs = self.span_values(first)?;
                let values = self.span_values(sources.get(1)?)?;
                Some(probs.iter().zip(&values).map(|(p, v)| p * v).sum())
            }
        }
    }
}

fn mean(vals: &[f32]) -> f32 {
    if vals.is_empty() {
        return 0.0;
    }
    vals.iter().sum::<f32>() / vals.len() as f32
}

fn gelu(x: f32) -> f32 {
    let c = (2.0 / std::f32::consts::PI).sqrt();
    0.5 * x * (1.0 + (c * (x + 0.044715 * x.powi(3))).tanh())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{build_layout, Axis, ModelShape};

    fn fixture() -> (ModelLayout, ModelWeights) {
        let layout = build_layout(&ModelShape::default()).unwrap();
        let weights = ModelWeights::synthetic(&layout, 7);
        (layout, weights)
    }

    #[test]
    fn residual_is_sum_of_looked_up_embeddings() {
        let (layout, weights) = fixture();
        let mut cache = ValueCache::default();
        let mut eval = Evaluator::new(&layout, &weights, &mut cache);
        let emb = &layout.embedding;

        let tok = eval.value(emb.tok_embed, CellIdx::new(1, 7)).unwrap();
        let pos = eval.value(emb.pos_embed, CellIdx::new(3, 7)).unwrap();
        let residual = eval.value(emb.residual, CellIdx::new(3, 7)).unwrap();
        assert!((residual - (tok + pos)).abs() < 1e-6);
        assert_eq!(eval.value(emb.tokens, CellIdx::new(3, 0)), Some(1.0));
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let (layout, weights) = fixture();
        let mut cache = ValueCache::default();
        let mut eval = Evaluator::new(&layout, &weights, &mut cache);
        let head = &layout.layers[0].heads[0];
        for q in 0..layout.shape.seq_len {
            let row: f32 = (0..=q)
                .map(|k| eval.value(head.attn_softmax, CellIdx::new(k, q)).unwrap())
                .sum();
            assert!((row - 1.0).abs() < 1e-4, "row {q} sums to {row}");
        }

        let probs = layout.block(layout.output.probs);
        let t = 5;
        let total: f32 = (0..probs.extent(Axis::Y))
            .map(|v| eval.value(probs.id, CellIdx::new(t, v)).unwrap())
            .sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn masked_cells_have_no_value() {
        let (layout, weights) = fixture();
        let mut cache = ValueCache::default();
        let mut eval = Evaluator::new(&layout, &weights, &mut cache);
        let head = &layout.layers[2].heads[1];
        assert_eq!(eval.value(head.attn, CellIdx::new(3, 1)), None);
        assert_eq!(eval.value(head.attn_softmax, CellIdx::new(3, 1)), None);
    }

    #[test]
    fn layer_norm_output_is_normalized_before_scaling() {
        let (layout, mut weights) = fixture();
        let ln = layout.layers[0].ln1.clone();
        let channels = layout.shape.channels;
        weights.set_tensor("layer0.ln1.gamma", vec![1.0; channels]);
        weights.set_tensor("layer0.ln1.beta", vec![0.0; channels]);

        let mut cache = ValueCache::default();
        let mut eval = Evaluator::new(&layout, &weights, &mut cache);
        let vals: Vec<f32> = (0..channels)
            .map(|c| eval.value(ln.out, CellIdx::new(2, c)).unwrap())
            .collect();
        assert!(mean(&vals).abs() < 1e-4);
        let var = vals.iter().map(|v| v * v).sum::<f32>() / channels as f32;
        assert!((var - 1.0).abs() < 1e-2);
    }

    #[test]
    fn evaluation_is_memoized() {
        let (layout, weights) = fixture();
        let mut cache = ValueCache::default();
        let first = {
            let mut eval = Evaluator::new(&layout, &weights, &mut cache);
            eval.value(layout.output.probs, CellIdx::new(0, 0))
        };
        let cached = cache.len();
        assert!(cached > 0);
        let second = Evaluator::new(&layout, &weights, &mut cache)
            .value(layout.output.probs, CellIdx::new(0, 0));
        assert_eq!(first, second);
        assert_eq!(cache.len(), cached);
    }
}
