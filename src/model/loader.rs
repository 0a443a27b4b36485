//! Load GPT weights from a JSON weight document.
//!
//! Two on-disk layouts are accepted and normalized into the same
//! [`ModelWeights`]:
//!
//! * **Canonical**: `config`, `vocab`, `tok_emb`, `pos_emb`, `layers[]` with
//!   `ln1_w`, `attn_qkv_w`, `fc1_w`, ... and optional `ln_f_w`/`ln_f_b`.
//!   Projection matrices are stored as output-feature rows already.
//! * **Blocks**: `meta`, `tok_emb`, `pos_emb`, `blocks[]` with `ln1_g`,
//!   `Wqkv`, `W1`, ... and optional `ln_f_g`/`ln_f_b`. Projection matrices
//!   are stored input-major and are transposed here.
//!
//! Either the whole document loads and validates, or an error naming the
//! offending field is returned.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::config::GptConfig;
use super::weights::{LayerWeights, Linear, ModelWeights, NormWeights};
use crate::errors::GptError;
use crate::kernels::Tensor2D;

type Matrix = Vec<Vec<f32>>;

/// Which on-disk layout a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightLayout {
    Canonical,
    Blocks,
}

impl WeightLayout {
    /// `blocks` or `meta` at the top level marks the blocks layout.
    pub fn detect(doc: &Value) -> Self {
        if doc.get("blocks").is_some() || doc.get("meta").is_some() {
            WeightLayout::Blocks
        } else {
            WeightLayout::Canonical
        }
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    config: Option<GptConfig>,
}

#[derive(Debug, Deserialize)]
struct CanonicalLayer {
    ln1_w: Vec<f32>,
    ln1_b: Vec<f32>,
    ln2_w: Vec<f32>,
    ln2_b: Vec<f32>,
    attn_qkv_w: Matrix,
    attn_qkv_b: Vec<f32>,
    attn_proj_w: Matrix,
    attn_proj_b: Vec<f32>,
    fc1_w: Matrix,
    fc1_b: Vec<f32>,
    fc2_w: Matrix,
    fc2_b: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct CanonicalDocument {
    #[serde(alias = "cfg")]
    config: Option<GptConfig>,
    metadata: Option<Metadata>,
    vocab: Vec<String>,
    tok_emb: Matrix,
    pos_emb: Matrix,
    layers: Vec<CanonicalLayer>,
    ln_f_w: Option<Vec<f32>>,
    ln_f_b: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct BlocksMeta {
    vocab_size: usize,
    d_model: usize,
    n_layers: usize,
    n_heads: usize,
    max_seq_len: usize,
    d_ff: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Block {
    ln1_g: Vec<f32>,
    ln1_b: Vec<f32>,
    ln2_g: Vec<f32>,
    ln2_b: Vec<f32>,
    #[serde(rename = "Wqkv")]
    w_qkv: Matrix,
    bqkv: Vec<f32>,
    #[serde(rename = "Wo")]
    w_o: Matrix,
    bo: Vec<f32>,
    #[serde(rename = "W1")]
    w_1: Matrix,
    b1: Vec<f32>,
    #[serde(rename = "W2")]
    w_2: Matrix,
    b2: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BlocksDocument {
    meta: BlocksMeta,
    vocab: Option<Vec<String>>,
    tok_emb: Matrix,
    pos_emb: Matrix,
    blocks: Vec<Block>,
    ln_f_g: Option<Vec<f32>>,
    ln_f_b: Option<Vec<f32>>,
}

/// A parsed document, before conversion to [`ModelWeights`].
#[derive(Debug)]
enum WeightDocument {
    Canonical(Box<CanonicalDocument>),
    Blocks(Box<BlocksDocument>),
}

impl WeightDocument {
    fn parse(doc: Value) -> Result<Self, GptError> {
        let layout = WeightLayout::detect(&doc);
        debug!("Weight document layout: {:?}", layout);
        Ok(match layout {
            WeightLayout::Canonical => WeightDocument::Canonical(Box::new(
                serde_json::from_value(doc)
                    .map_err(|e| GptError::Config(format!("weight document: {}", e)))?,
            )),
            WeightLayout::Blocks => WeightDocument::Blocks(Box::new(
                serde_json::from_value(doc)
                    .map_err(|e| GptError::Config(format!("weight document (blocks): {}", e)))?,
            )),
        })
    }

    fn into_weights(self) -> Result<ModelWeights, GptError> {
        match self {
            WeightDocument::Canonical(doc) => canonical_to_weights(*doc),
            WeightDocument::Blocks(doc) => blocks_to_weights(*doc),
        }
    }
}

/// Convert nested rows to a tensor, naming `field` on ragged input.
fn matrix(field: &str, rows: Matrix) -> Result<Tensor2D, GptError> {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if let Some((i, bad)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
        return Err(GptError::shape(
            format!("{}[{}]", field, i),
            format!("{} columns", cols),
            format!("{} columns", bad.len()),
        ));
    }
    let n = rows.len();
    Tensor2D::from_vec(n, cols, rows.into_iter().flatten().collect())
}

/// Input-major `D × O` matrix to the `O × D` output-feature layout.
fn transposed(field: &str, rows: Matrix) -> Result<Tensor2D, GptError> {
    Ok(matrix(field, rows)?.transpose())
}

fn final_norm(
    gain_field: &str,
    bias_field: &str,
    gain: Option<Vec<f32>>,
    bias: Option<Vec<f32>>,
) -> Result<Option<NormWeights>, GptError> {
    match (gain, bias) {
        (Some(gain), Some(bias)) => Ok(Some(NormWeights { gain, bias })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(GptError::Config(format!(
            "{} is present but {} is missing",
            gain_field, bias_field
        ))),
        (None, Some(_)) => Err(GptError::Config(format!(
            "{} is present but {} is missing",
            bias_field, gain_field
        ))),
    }
}

fn canonical_to_weights(doc: CanonicalDocument) -> Result<ModelWeights, GptError> {
    let config = doc
        .config
        .or_else(|| doc.metadata.and_then(|m| m.config))
        .ok_or_else(|| GptError::Config("missing key 'config'".into()))?;

    let layers = doc
        .layers
        .into_iter()
        .enumerate()
        .map(|(i, l)| -> Result<LayerWeights, GptError> {
            let p = |name: &str| format!("layers[{}].{}", i, name);
            Ok(LayerWeights {
                ln1: NormWeights {
                    gain: l.ln1_w,
                    bias: l.ln1_b,
                },
                ln2: NormWeights {
                    gain: l.ln2_w,
                    bias: l.ln2_b,
                },
                attn_qkv: Linear {
                    weight: matrix(&p("attn_qkv_w"), l.attn_qkv_w)?,
                    bias: l.attn_qkv_b,
                },
                attn_proj: Linear {
                    weight: matrix(&p("attn_proj_w"), l.attn_proj_w)?,
                    bias: l.attn_proj_b,
                },
                fc1: Linear {
                    weight: matrix(&p("fc1_w"), l.fc1_w)?,
                    bias: l.fc1_b,
                },
                fc2: Linear {
                    weight: matrix(&p("fc2_w"), l.fc2_w)?,
                    bias: l.fc2_b,
                },
            })
        })
        .collect::<Result<Vec<_>, GptError>>()?;

    Ok(ModelWeights {
        config,
        vocab: Some(doc.vocab),
        tok_emb: matrix("tok_emb", doc.tok_emb)?,
        pos_emb: matrix("pos_emb", doc.pos_emb)?,
        layers,
        final_norm: final_norm("ln_f_w", "ln_f_b", doc.ln_f_w, doc.ln_f_b)?,
    })
}

fn blocks_to_weights(doc: BlocksDocument) -> Result<ModelWeights, GptError> {
    let meta = doc.meta;
    let d_ff = match meta.d_ff {
        Some(d_ff) => d_ff,
        None => doc
            .blocks
            .first()
            .and_then(|b| b.w_1.first())
            .map(|row| row.len())
            .ok_or_else(|| {
                GptError::Config("meta.d_ff is missing and blocks[0].W1 is empty".into())
            })?,
    };
    let config = GptConfig {
        vocab_size: meta.vocab_size,
        d_model: meta.d_model,
        n_head: meta.n_heads,
        n_layer: meta.n_layers,
        d_ff,
        max_seq: meta.max_seq_len,
    };

    let layers = doc
        .blocks
        .into_iter()
        .enumerate()
        .map(|(i, b)| -> Result<LayerWeights, GptError> {
            let p = |name: &str| format!("blocks[{}].{}", i, name);
            Ok(LayerWeights {
                ln1: NormWeights {
                    gain: b.ln1_g,
                    bias: b.ln1_b,
                },
                ln2: NormWeights {
                    gain: b.ln2_g,
                    bias: b.ln2_b,
                },
                attn_qkv: Linear {
                    weight: transposed(&p("Wqkv"), b.w_qkv)?,
                    bias: b.bqkv,
                },
                attn_proj: Linear {
                    weight: transposed(&p("Wo"), b.w_o)?,
                    bias: b.bo,
                },
                fc1: Linear {
                    weight: transposed(&p("W1"), b.w_1)?,
                    bias: b.b1,
                },
                fc2: Linear {
                    weight: transposed(&p("W2"), b.w_2)?,
                    bias: b.b2,
                },
            })
        })
        .collect::<Result<Vec<_>, GptError>>()?;

    Ok(ModelWeights {
        config,
        vocab: doc.vocab,
        tok_emb: matrix("tok_emb", doc.tok_emb)?,
        pos_emb: matrix("pos_emb", doc.pos_emb)?,
        layers,
        final_norm: final_norm("ln_f_g", "ln_f_b", doc.ln_f_g, doc.ln_f_b)?,
    })
}

/// Build validated weights from an already-parsed JSON value.
pub fn weights_from_value(doc: Value) -> Result<ModelWeights, GptError> {
    if !doc.is_object() {
        return Err(GptError::Config("weight document must be a JSON object".into()));
    }
    let weights = WeightDocument::parse(doc)?.into_weights()?;
    weights.validate()?;
    Ok(weights)
}

/// Parse and validate a weight document from a string.
pub fn parse_weights(json: &str) -> Result<ModelWeights, GptError> {
    let doc: Value = serde_json::from_str(json)?;
    weights_from_value(doc)
}

/// Read, parse and validate a weight document from disk.
pub fn load_weights(path: impl AsRef<Path>) -> Result<ModelWeights, GptError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let weights = parse_weights(&text)?;
    info!(
        "Loaded {} ({} layers, d_model={}, vocab={}, {} params)",
        path.display(),
        weights.num_layers(),
        weights.d_model(),
        weights.vocab_size(),
        weights.parameter_count()
    );
    Ok(weights)
}

/// Serialize weights into the canonical document layout.
pub fn to_canonical_json(weights: &ModelWeights) -> Value {
    let rows = |t: &Tensor2D| -> Vec<Vec<f32>> { t.iter_rows().map(|r| r.to_vec()).collect() };
    let layers: Vec<Value> = weights
        .layers
        .iter()
        .map(|l| {
            serde_json::json!({
                "ln1_w": l.ln1.gain, "ln1_b": l.ln1.bias,
                "ln2_w": l.ln2.gain, "ln2_b": l.ln2.bias,
                "attn_qkv_w": rows(&l.attn_qkv.weight), "attn_qkv_b": l.attn_qkv.bias,
                "attn_proj_w": rows(&l.attn_proj.weight), "attn_proj_b": l.attn_proj.bias,
                "fc1_w": rows(&l.fc1.weight), "fc1_b": l.fc1.bias,
                "fc2_w": rows(&l.fc2.weight), "fc2_b": l.fc2.bias,
            })
        })
        .collect();
    let mut doc = serde_json::json!({
        "config": weights.config,
        "vocab": weights.vocab.clone().unwrap_or_default(),
        "tok_emb": rows(&weights.tok_emb),
        "pos_emb": rows(&weights.pos_emb),
        "layers": layers,
    });
    if let (Some(norm), Some(obj)) = (&weights.final_norm, doc.as_object_mut()) {
        obj.insert("ln_f_w".into(), serde_json::json!(norm.gain));
        obj.insert("ln_f_b".into(), serde_json::json!(norm.bias));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eye(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect()
    }

    /// vocab 3, d_model 2, one head, d_ff 3, max_seq 2.
    fn canonical_doc() -> Value {
        json!({
            "config": {"vocab_size": 3, "d_model": 2, "n_head": 1, "n_layer": 1, "d_ff": 3, "max_seq": 2},
            "vocab": ["<unk>", "a", "b"],
            "tok_emb": [[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]],
            "pos_emb": [[0.0, 0.0], [0.01, 0.02]],
            "layers": [{
                "ln1_w": [1.0, 1.0], "ln1_b": [0.0, 0.0],
                "ln2_w": [1.0, 1.0], "ln2_b": [0.0, 0.0],
                "attn_qkv_w": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0], [9.0, 10.0], [11.0, 12.0]],
                "attn_qkv_b": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                "attn_proj_w": eye(2), "attn_proj_b": [0.0, 0.0],
                "fc1_w": [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], "fc1_b": [0.0, 0.0, 0.0],
                "fc2_w": [[1.0, 0.0, 0.5], [0.0, 1.0, 0.5]], "fc2_b": [0.0, 0.0]
            }],
            "ln_f_w": [1.0, 1.0], "ln_f_b": [0.0, 0.0]
        })
    }

    /// Same model in the blocks layout (matrices stored input-major).
    fn blocks_doc() -> Value {
        json!({
            "meta": {"vocab_size": 3, "d_model": 2, "n_layers": 1, "n_heads": 1, "max_seq_len": 2},
            "vocab": ["<unk>", "a", "b"],
            "tok_emb": [[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]],
            "pos_emb": [[0.0, 0.0], [0.01, 0.02]],
            "blocks": [{
                "ln1_g": [1.0, 1.0], "ln1_b": [0.0, 0.0],
                "ln2_g": [1.0, 1.0], "ln2_b": [0.0, 0.0],
                "Wqkv": [[1.0, 3.0, 5.0, 7.0, 9.0, 11.0], [2.0, 4.0, 6.0, 8.0, 10.0, 12.0]],
                "bqkv": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                "Wo": eye(2), "bo": [0.0, 0.0],
                "W1": [[1.0, 0.0, 1.0], [0.0, 1.0, 1.0]], "b1": [0.0, 0.0, 0.0],
                "W2": [[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]], "b2": [0.0, 0.0]
            }],
            "ln_f_g": [1.0, 1.0], "ln_f_b": [0.0, 0.0]
        })
    }

    #[test]
    fn detects_layout() {
        assert_eq!(WeightLayout::detect(&canonical_doc()), WeightLayout::Canonical);
        assert_eq!(WeightLayout::detect(&blocks_doc()), WeightLayout::Blocks);
    }

    #[test]
    fn blocks_layout_matches_canonical_after_transpose() {
        let a = weights_from_value(canonical_doc()).unwrap();
        let b = weights_from_value(blocks_doc()).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.config.d_ff, 3);
        assert_eq!(b.layers[0].attn_qkv.weight.row(0), &[1.0, 2.0]);
    }

    #[test]
    fn config_aliases_are_accepted() {
        let mut doc = canonical_doc();
        let cfg = doc.as_object_mut().unwrap().remove("config").unwrap();
        doc["cfg"] = cfg.clone();
        weights_from_value(doc).unwrap();

        let mut doc = canonical_doc();
        doc.as_object_mut().unwrap().remove("config");
        doc["metadata"] = json!({ "config": cfg });
        weights_from_value(doc).unwrap();
    }

    #[test]
    fn missing_config_is_reported() {
        let mut doc = canonical_doc();
        doc.as_object_mut().unwrap().remove("config");
        let err = weights_from_value(doc).unwrap_err().to_string();
        assert!(err.contains("config"), "{}", err);
    }

    #[test]
    fn missing_layer_field_is_named() {
        let mut doc = canonical_doc();
        doc["layers"][0].as_object_mut().unwrap().remove("fc2_b");
        let err = weights_from_value(doc).unwrap_err().to_string();
        assert!(err.contains("fc2_b"), "{}", err);
    }

    #[test]
    fn ragged_matrix_is_named() {
        let mut doc = canonical_doc();
        doc["layers"][0]["fc1_w"] = json!([[1.0, 0.0], [0.0]]);
        let err = weights_from_value(doc).unwrap_err().to_string();
        assert!(err.contains("layers[0].fc1_w[1]"), "{}", err);
    }

    #[test]
    fn wrong_size_is_a_shape_mismatch() {
        let mut doc = canonical_doc();
        doc["layers"][0]["attn_proj_b"] = json!([0.0, 0.0, 0.0]);
        match weights_from_value(doc) {
            Err(GptError::ShapeMismatch { field, .. }) => {
                assert_eq!(field, "layers[0].attn_proj_b")
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn vocab_length_must_match() {
        let mut doc = canonical_doc();
        doc["vocab"] = json!(["a", "b"]);
        let err = weights_from_value(doc).unwrap_err().to_string();
        assert!(err.contains("vocab"), "{}", err);
    }

    #[test]
    fn indivisible_heads_are_rejected() {
        let mut doc = canonical_doc();
        doc["config"]["n_head"] = json!(3);
        assert!(weights_from_value(doc).is_err());
    }

    #[test]
    fn half_final_norm_is_rejected() {
        let mut doc = canonical_doc();
        doc.as_object_mut().unwrap().remove("ln_f_b");
        let err = weights_from_value(doc).unwrap_err().to_string();
        assert!(err.contains("ln_f_b"), "{}", err);
    }

    #[test]
    fn final_norm_is_optional() {
        let mut doc = canonical_doc();
        let obj = doc.as_object_mut().unwrap();
        obj.remove("ln_f_w");
        obj.remove("ln_f_b");
        let w = weights_from_value(doc).unwrap();
        assert!(w.final_norm.is_none());
    }

    #[test]
    fn canonical_export_reloads() {
        let w = crate::model::demo::create_demo_model_seeded(5);
        let reloaded = weights_from_value(to_canonical_json(&w)).unwrap();
        assert_eq!(reloaded, w);
    }

    #[test]
    fn load_weights_reports_missing_file() {
        let err = load_weights("/nonexistent/weights.json").unwrap_err();
        assert!(matches!(err, GptError::Io(_)));
    }
}
