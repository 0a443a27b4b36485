//! Dense CPU kernels: matmul, bias add, layer norm, GELU, softmax.

#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;

use super::tensor::Tensor2D;

/// Epsilon added to the variance inside [`layer_norm`].
pub const LAYER_NORM_EPS: f32 = 1e-5;

const GELU_COEF: f32 = 0.044_715;
const SQRT_2_OVER_PI: f32 = 0.797_884_560_8;

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `A [T x D] · Wᵀ` where `W` is stored as `[O x D]` output-feature rows.
///
/// Each output row is independent, so rows are computed in parallel; every
/// cell is still a single sequential dot product.
pub fn matmul(a: &Tensor2D, w: &Tensor2D) -> Tensor2D {
    debug_assert_eq!(a.cols(), w.cols());
    let out_features = w.rows();
    let mut out = Tensor2D::zeros(a.rows(), out_features);
    if out_features == 0 {
        return out;
    }

    out.as_mut_slice()
        .par_chunks_mut(out_features)
        .enumerate()
        .for_each(|(t, out_row)| {
            let input = a.row(t);
            for (o, out_val) in out_row.iter_mut().enumerate() {
                *out_val = dot(input, w.row(o));
            }
        });
    out
}

/// Per-column bias add: `X[t][o] + b[o]`.
pub fn add_bias(x: &Tensor2D, bias: &[f32]) -> Tensor2D {
    debug_assert_eq!(x.cols(), bias.len());
    let mut out = x.clone();
    for t in 0..out.rows() {
        for (v, b) in out.row_mut(t).iter_mut().zip(bias.iter()) {
            *v += b;
        }
    }
    out
}

/// Affine projection `X · Wᵀ + b`.
pub fn linear(x: &Tensor2D, weight: &Tensor2D, bias: &[f32]) -> Tensor2D {
    add_bias(&matmul(x, weight), bias)
}

/// Normalize one row to zero mean / unit variance (no affine transform).
pub fn normalize_row(row: &[f32], eps: f32) -> Vec<f32> {
    let n = row.len() as f32;
    let mean = row.iter().sum::<f32>() / n;
    let var = row.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n;
    let inv = 1.0 / (var + eps).sqrt();
    row.iter().map(|x| (x - mean) * inv).collect()
}

/// Row-wise layer normalization, then scale by `gain` and shift by `bias`.
pub fn layer_norm(x: &Tensor2D, gain: &[f32], bias: &[f32], eps: f32) -> Tensor2D {
    debug_assert_eq!(x.cols(), gain.len());
    debug_assert_eq!(x.cols(), bias.len());
    let mut out = Tensor2D::zeros(x.rows(), x.cols());
    for t in 0..x.rows() {
        let normed = normalize_row(x.row(t), eps);
        let dst = out.row_mut(t);
        for i in 0..normed.len() {
            dst[i] = normed[i] * gain[i] + bias[i];
        }
    }
    out
}

/// GELU, tanh approximation.
#[inline]
pub fn gelu(x: f32) -> f32 {
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + GELU_COEF * x * x * x)).tanh())
}

pub fn gelu_tensor(x: Tensor2D) -> Tensor2D {
    x.map(gelu)
}

/// Numerically stable softmax. A row that is entirely `-inf` maps to zeros.
pub fn softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return vec![0.0; row.len()];
    }
    let exp: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}
