//! Inference engine: dense forward pass through the GPT model.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::errors::GptError;
use crate::kernels::{causal_self_attention, dot, gelu_tensor, Tensor2D};
use crate::model::{LayerWeights, ModelWeights};

/// Engine that runs the full-window forward pass over shared weights.
#[derive(Clone)]
pub struct InferenceEngine {
    weights: Arc<ModelWeights>,
}

impl InferenceEngine {
    /// Validates every tensor shape against the config before accepting the weights.
    pub fn new(weights: ModelWeights) -> Result<Self, GptError> {
        Self::from_arc(Arc::new(weights))
    }

    pub fn from_arc(weights: Arc<ModelWeights>) -> Result<Self, GptError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &Arc<ModelWeights> {
        &self.weights
    }

    /// Logits for the position after the last id, `[vocab_size]`.
    ///
    /// Only the last `max_seq` ids are used; positions restart at 0 for the
    /// oldest retained id.
    pub fn forward(&self, input_ids: &[usize]) -> Result<Vec<f32>> {
        if input_ids.is_empty() {
            anyhow::bail!("input_ids must not be empty");
        }
        let max_seq = self.weights.config.max_seq;
        let window = if input_ids.len() > max_seq {
            debug!(
                "Truncating {} ids to the last {} for the forward pass",
                input_ids.len(),
                max_seq
            );
            &input_ids[input_ids.len() - max_seq..]
        } else {
            input_ids
        };

        let mut hidden = self.embed(window)?;
        for layer in &self.weights.layers {
            hidden = self.forward_layer(&hidden, layer);
        }
        if let Some(norm) = &self.weights.final_norm {
            hidden = norm.forward(&hidden);
        }

        let last = hidden.row(hidden.rows() - 1);
        Ok(self.weights.tok_emb.iter_rows().map(|emb| dot(last, emb)).collect())
    }

    /// Token plus position embeddings, `[T, d_model]`.
    pub fn embed(&self, ids: &[usize]) -> Result<Tensor2D, GptError> {
        let w = &self.weights;
        let vocab_size = w.vocab_size();
        let mut x = Tensor2D::zeros(ids.len(), w.d_model());
        for (pos, &id) in ids.iter().enumerate() {
            if id >= vocab_size {
                return Err(GptError::InvalidToken { id, vocab_size });
            }
            let tok = w.tok_emb.row(id);
            let p = w.pos_emb.row(pos);
            for ((dst, a), b) in x.row_mut(pos).iter_mut().zip(tok).zip(p) {
                *dst = a + b;
            }
        }
        Ok(x)
    }

    /// One pre-norm block: `x + attn(ln1(x))`, then `x + mlp(ln2(x))`.
    pub fn forward_layer(&self, hidden: &Tensor2D, layer: &LayerWeights) -> Tensor2D {
        let normed = layer.ln1.forward(hidden);
        let attn_out = causal_self_attention(
            &normed,
            &layer.attn_qkv.weight,
            &layer.attn_qkv.bias,
            &layer.attn_proj.weight,
            &layer.attn_proj.bias,
            self.weights.config.n_head,
        );
        let hidden = hidden.add(&attn_out);

        let normed2 = layer.ln2.forward(&hidden);
        let ffn_out = self.feed_forward(&normed2, layer);
        hidden.add(&ffn_out)
    }

    /// MLP: fc1, GELU, fc2.
    pub fn feed_forward(&self, hidden: &Tensor2D, layer: &LayerWeights) -> Tensor2D {
        layer.fc2.forward(&gelu_tensor(layer.fc1.forward(hidden)))
    }
}
