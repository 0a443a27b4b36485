//! Logits → next token id: temperature, top-k, softmax, top-p, categorical draw.
//!
//! Every step is a pure function of its inputs; the only randomness is the
//! single uniform draw taken from the caller's RNG, so a seeded RNG makes the
//! whole pipeline reproducible.

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::kernels::softmax;

/// Temperatures at or below this floor (and non-finite ones) are clamped to it.
pub const MIN_TEMPERATURE: f32 = 1e-6;

/// Sampling knobs for one generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub temperature: f32,
    /// Keep the k highest logits (ties at the k-th value survive). 0 disables.
    pub top_k: usize,
    /// Nucleus mass in (0, 1). Values outside that range disable the filter.
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_k: 40,
            top_p: 1.0,
        }
    }
}

impl SamplingParams {
    /// Pure temperature softmax, no filtering.
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            top_k: 0,
            top_p: 1.0,
        }
    }
}

pub fn clamp_temperature(temperature: f32) -> f32 {
    if temperature.is_finite() && temperature > MIN_TEMPERATURE {
        temperature
    } else {
        MIN_TEMPERATURE
    }
}

pub fn apply_temperature(logits: &[f32], temperature: f32) -> Vec<f32> {
    let t = clamp_temperature(temperature);
    logits.iter().map(|&v| v / t).collect()
}

/// Mask everything below the k-th largest value with `-inf`.
///
/// Entries equal to the threshold are kept, so more than `k` may survive.
/// `k == 0` or `k >= len` leaves the input untouched.
pub fn top_k_filter(logits: &mut [f32], k: usize) {
    if k == 0 || k >= logits.len() {
        return;
    }
    let mut sorted = logits.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let threshold = sorted[k - 1];
    for v in logits.iter_mut() {
        if *v < threshold {
            *v = f32::NEG_INFINITY;
        }
    }
}

/// Keep the shortest probability-sorted prefix whose mass reaches `p`, zero
/// the rest and renormalize. Applies only when `0 < p < 1`; at least one
/// entry always survives.
pub fn top_p_filter(probs: &mut [f32], p: f32) {
    if !(p > 0.0 && p < 1.0) || probs.is_empty() {
        return;
    }
    let mut order: Vec<usize> = (0..probs.len()).collect();
    // stable: equal probabilities keep index order
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut cum = 0.0f32;
    let mut keep = 0;
    for &i in &order {
        cum += probs[i];
        keep += 1;
        if cum >= p {
            break;
        }
    }

    let mut kept_mass = 0.0f32;
    for (rank, &i) in order.iter().enumerate() {
        if rank < keep {
            kept_mass += probs[i];
        } else {
            probs[i] = 0.0;
        }
    }
    if kept_mass > 0.0 {
        for v in probs.iter_mut() {
            *v /= kept_mass;
        }
    }
}

/// Inverse-CDF draw for `r` in `[0, 1)`.
///
/// Returns the first index with non-zero probability whose cumulative mass is
/// at least `r`; on rounding fall-through, the last index with non-zero mass.
pub fn sample_from_probs(probs: &[f32], r: f32) -> usize {
    let mut cum = 0.0f32;
    let mut last_nonzero = None;
    for (i, &p) in probs.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        cum += p;
        last_nonzero = Some(i);
        if r <= cum {
            return i;
        }
    }
    last_nonzero.unwrap_or(probs.len().saturating_sub(1))
}

/// Stateless sampler applying [`SamplingParams`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Sampler {
    params: SamplingParams,
}

impl Sampler {
    pub fn new(params: SamplingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// Final distribution after temperature, top-k, softmax and top-p.
    pub fn probabilities(&self, logits: &[f32]) -> Vec<f32> {
        let mut scaled = apply_temperature(logits, self.params.temperature);
        top_k_filter(&mut scaled, self.params.top_k);
        let mut probs = softmax(&scaled);
        top_p_filter(&mut probs, self.params.top_p);
        probs
    }

    pub fn sample<R: Rng + ?Sized>(&self, logits: &[f32], rng: &mut R) -> Result<usize> {
        if logits.is_empty() {
            anyhow::bail!("cannot sample from empty logits");
        }
        let probs = self.probabilities(logits);
        let r: f32 = rng.gen();
        Ok(sample_from_probs(&probs, r))
    }
}
