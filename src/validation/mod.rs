//! Model health checks: NaN/Inf propagation, all-zero tensors, forward pass
//! sanity. Backs the CLI `info` command.

use anyhow::Result;
use serde::Serialize;

use crate::inference::InferenceEngine;
use crate::model::{GptConfig, Linear, ModelWeights};
use crate::utils::argmax;

/// Statistics for a tensor: min, max, mean, std, and anomaly flags.
#[derive(Debug, Clone, Serialize)]
pub struct TensorStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
    pub count: usize,
    pub nan_count: usize,
    pub inf_count: usize,
    pub zero_count: usize,
}

impl TensorStats {
    pub fn from_slice(slice: &[f32]) -> Self {
        let count = slice.len();
        let nan_count = slice.iter().filter(|x| x.is_nan()).count();
        let inf_count = slice.iter().filter(|x| x.is_infinite()).count();
        let zero_count = slice.iter().filter(|&&x| x == 0.0).count();

        let finite = || slice.iter().copied().filter(|x| x.is_finite());
        let finite_count = count - nan_count - inf_count;
        let mean = if finite_count > 0 {
            finite().sum::<f32>() / finite_count as f32
        } else {
            f32::NAN
        };
        let var: f32 = finite().map(|x| (x - mean) * (x - mean)).sum();
        let std = if finite_count > 1 {
            (var / (finite_count - 1) as f32).sqrt()
        } else {
            0.0
        };
        let min = finite().fold(f32::INFINITY, f32::min);
        let max = finite().fold(f32::NEG_INFINITY, f32::max);

        Self {
            min: if min == f32::INFINITY { 0.0 } else { min },
            max: if max == f32::NEG_INFINITY { 0.0 } else { max },
            mean,
            std,
            count,
            nan_count,
            inf_count,
            zero_count,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.nan_count == 0 && self.inf_count == 0
    }

    pub fn is_all_zero(&self) -> bool {
        self.zero_count == self.count
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub layer_idx: usize,
    pub attn_qkv: TensorStats,
    pub attn_proj: TensorStats,
    pub fc1: TensorStats,
    pub fc2: TensorStats,
}

/// Static checks over every weight tensor.
#[derive(Debug, Clone, Serialize)]
pub struct WeightReport {
    pub ok: bool,
    pub config: GptConfig,
    pub parameter_count: usize,
    pub has_vocab: bool,
    pub has_final_norm: bool,
    pub tok_emb: TensorStats,
    pub pos_emb: TensorStats,
    pub layers: Vec<LayerReport>,
    pub errors: Vec<String>,
}

/// Forward pass over a probe window.
#[derive(Debug, Clone, Serialize)]
pub struct LogitsReport {
    pub ok: bool,
    pub probe_ids: Vec<usize>,
    /// Last-row hidden state after each block.
    pub layer_stats: Vec<TensorStats>,
    pub logits: TensorStats,
    pub predicted_id: Option<usize>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub weights: WeightReport,
    pub forward_pass: LogitsReport,
    pub passed: bool,
}

fn weight_stats(l: &Linear) -> TensorStats {
    TensorStats::from_slice(l.weight.as_slice())
}

pub fn weight_report(weights: &ModelWeights) -> WeightReport {
    let mut errors = Vec::new();
    if let Err(e) = weights.validate() {
        errors.push(e.to_string());
    }

    let tok_emb = TensorStats::from_slice(weights.tok_emb.as_slice());
    let pos_emb = TensorStats::from_slice(weights.pos_emb.as_slice());
    if !tok_emb.is_healthy() {
        errors.push("tok_emb contains NaN or Inf".to_string());
    }
    if tok_emb.is_all_zero() && tok_emb.count > 0 {
        errors.push("tok_emb is all zeros".to_string());
    }
    if !pos_emb.is_healthy() {
        errors.push("pos_emb contains NaN or Inf".to_string());
    }

    let layers: Vec<LayerReport> = weights
        .layers
        .iter()
        .enumerate()
        .map(|(layer_idx, l)| LayerReport {
            layer_idx,
            attn_qkv: weight_stats(&l.attn_qkv),
            attn_proj: weight_stats(&l.attn_proj),
            fc1: weight_stats(&l.fc1),
            fc2: weight_stats(&l.fc2),
        })
        .collect();
    for l in &layers {
        for (name, s) in [
            ("attn_qkv_w", &l.attn_qkv),
            ("attn_proj_w", &l.attn_proj),
            ("fc1_w", &l.fc1),
            ("fc2_w", &l.fc2),
        ] {
            if !s.is_healthy() {
                errors.push(format!("layers[{}].{} contains NaN or Inf", l.layer_idx, name));
            }
        }
    }

    WeightReport {
        ok: errors.is_empty(),
        config: weights.config.clone(),
        parameter_count: weights.parameter_count(),
        has_vocab: weights.vocab.is_some(),
        has_final_norm: weights.final_norm.is_some(),
        tok_emb,
        pos_emb,
        layers,
        errors,
    }
}

/// Run the forward pass block by block and check each stage for NaN/Inf.
pub fn logits_report(engine: &InferenceEngine, probe_ids: &[usize]) -> Result<LogitsReport> {
    let weights = engine.weights();
    let mut errors = Vec::new();
    if probe_ids.is_empty() {
        errors.push("probe_ids must not be empty".to_string());
        return Ok(LogitsReport {
            ok: false,
            probe_ids: vec![],
            layer_stats: vec![],
            logits: TensorStats::from_slice(&[]),
            predicted_id: None,
            errors,
        });
    }

    let window = &probe_ids[probe_ids.len().saturating_sub(weights.config.max_seq)..];
    let mut hidden = engine.embed(window)?;
    let mut layer_stats = Vec::with_capacity(weights.layers.len());
    for (layer_idx, layer) in weights.layers.iter().enumerate() {
        hidden = engine.forward_layer(&hidden, layer);
        let stats = TensorStats::from_slice(hidden.row(hidden.rows() - 1));
        if !stats.is_healthy() {
            errors.push(format!("layer {} output has NaN or Inf", layer_idx));
        }
        layer_stats.push(stats);
    }

    let logits = engine.forward(window)?;
    let logits_stats = TensorStats::from_slice(&logits);
    if !logits_stats.is_healthy() {
        errors.push("final logits contain NaN or Inf".to_string());
    }

    Ok(LogitsReport {
        ok: errors.is_empty(),
        probe_ids: window.to_vec(),
        layer_stats,
        logits: logits_stats,
        predicted_id: argmax(&logits),
        errors,
    })
}

/// Full report: static weight checks plus a forward pass on `probe_ids`.
pub fn validate_model(weights: &ModelWeights, probe_ids: &[usize]) -> Result<ValidationReport> {
    let engine = InferenceEngine::new(weights.clone())?;
    let weights_report = weight_report(weights);
    let forward_pass = logits_report(&engine, probe_ids)?;
    let passed = weights_report.ok && forward_pass.ok;
    Ok(ValidationReport {
        weights: weights_report,
        forward_pass,
        passed,
    })
}
