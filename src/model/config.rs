//! GPT model configuration.

use serde::{Deserialize, Serialize};

use crate::errors::GptError;

/// Shape parameters of a decoder-only transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GptConfig {
    /// Number of distinct token ids.
    pub vocab_size: usize,
    /// Embedding / hidden width.
    pub d_model: usize,
    /// Number of attention heads.
    pub n_head: usize,
    /// Number of transformer blocks.
    pub n_layer: usize,
    /// MLP hidden width.
    pub d_ff: usize,
    /// Longest window a forward pass sees.
    pub max_seq: usize,
}

impl Default for GptConfig {
    fn default() -> Self {
        Self {
            vocab_size: 96,
            d_model: 32,
            n_head: 4,
            n_layer: 2,
            d_ff: 64,
            max_seq: 64,
        }
    }
}

impl GptConfig {
    pub fn head_dim(&self) -> usize {
        self.d_model / self.n_head
    }

    /// Every dimension must be positive and `d_model` must split evenly
    /// across heads.
    pub fn validate(&self) -> Result<(), GptError> {
        let fields = [
            ("vocab_size", self.vocab_size),
            ("d_model", self.d_model),
            ("n_head", self.n_head),
            ("n_layer", self.n_layer),
            ("d_ff", self.d_ff),
            ("max_seq", self.max_seq),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(GptError::Config(format!("config.{} must be > 0", name)));
            }
        }
        if self.d_model % self.n_head != 0 {
            return Err(GptError::Config(format!(
                "config.d_model ({}) is not divisible by config.n_head ({})",
                self.d_model, self.n_head
            )));
        }
        Ok(())
    }
}
