//! Causal multi-head self-attention over a full window.
//!
//! Q, K and V come from one fused projection (`3·D` output features) and are
//! split by columns. Head `h` owns the contiguous column block
//! `[h·dh, (h+1)·dh)`. Heads are independent and run on the rayon pool.

use rayon::prelude::*;

use super::cpu::{dot, linear, softmax};
use super::tensor::Tensor2D;

/// Causal attention probabilities for one head.
///
/// `q` and `k` are `T × dh`. Returns a `T × T` matrix whose row `t` is a
/// distribution over positions `0..=t`; every entry above the diagonal is
/// exactly zero.
pub fn causal_attention_probs(q: &Tensor2D, k: &Tensor2D) -> Tensor2D {
    debug_assert_eq!(q.shape(), k.shape());
    let seq_len = q.rows();
    let scale = (q.cols() as f32).sqrt().recip();

    let mut probs = Tensor2D::zeros(seq_len, seq_len);
    for t in 0..seq_len {
        let scores: Vec<f32> = (0..=t).map(|u| dot(q.row(t), k.row(u)) * scale).collect();
        let p = softmax(&scores);
        probs.row_mut(t)[..=t].copy_from_slice(&p);
    }
    probs
}

/// One head: `probs · V`, `T × dh`.
fn head_forward(q: &Tensor2D, k: &Tensor2D, v: &Tensor2D) -> Tensor2D {
    let probs = causal_attention_probs(q, k);
    let head_dim = v.cols();
    let mut out = Tensor2D::zeros(q.rows(), head_dim);
    for t in 0..q.rows() {
        let weights = probs.row(t);
        let dst = out.row_mut(t);
        for (u, &p) in weights.iter().enumerate().take(t + 1) {
            for (o, &vv) in dst.iter_mut().zip(v.row(u)) {
                *o += p * vv;
            }
        }
    }
    out
}

/// Full attention sublayer: fused QKV projection, per-head causal attention,
/// head concatenation and output projection.
///
/// `x` is `T × D`, `qkv_weight` is `3D × D`, `proj_weight` is `D × D`.
pub fn causal_self_attention(
    x: &Tensor2D,
    qkv_weight: &Tensor2D,
    qkv_bias: &[f32],
    proj_weight: &Tensor2D,
    proj_bias: &[f32],
    n_head: usize,
) -> Tensor2D {
    let d_model = x.cols();
    debug_assert!(n_head > 0 && d_model % n_head == 0);
    let head_dim = d_model / n_head;
    let seq_len = x.rows();

    let qkv = linear(x, qkv_weight, qkv_bias);

    let heads: Vec<Tensor2D> = (0..n_head)
        .into_par_iter()
        .map(|h| {
            let off = h * head_dim;
            let q = qkv.columns(off, head_dim);
            let k = qkv.columns(d_model + off, head_dim);
            let v = qkv.columns(2 * d_model + off, head_dim);
            head_forward(&q, &k, &v)
        })
        .collect();

    let mut concat = Tensor2D::zeros(seq_len, d_model);
    for (h, head) in heads.iter().enumerate() {
        let off = h * head_dim;
        for t in 0..seq_len {
            concat.row_mut(t)[off..off + head_dim].copy_from_slice(head.row(t));
        }
    }

    linear(&concat, proj_weight, proj_bias)
}
