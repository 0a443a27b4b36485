//! # gpt-oxidized
//!
//! Decoder-only GPT inference on the CPU in pure Rust.
//!
//! ## Architecture
//!
//! - **Kernels**: dense row-major `Tensor2D`, rayon-parallel matmul, layer norm, GELU,
//!   stable softmax and causal multi-head self-attention
//! - **Model**: pre-norm transformer blocks with a tied output head, loaded from JSON
//!   weight documents in either the canonical or the `meta`/`blocks` layout
//! - **Inference**: full-window forward pass, temperature / top-k / top-p sampling with an
//!   explicit RNG, and an autoregressive decode loop over a sliding context window
//! - **Tokenizers**: byte-level BPE compatible with `tokenizer.json`, and a character codec

pub mod errors;
pub mod inference;
pub mod kernels;
pub mod model;
pub mod tokenizer;
pub mod utils;
pub mod validation;

pub use errors::GptError;
pub use inference::{
    generate, Context, InferenceEngine, LanguageModel, Sampler, SamplingParams, TextGenerator,
    TokenStream, MAX_NEW_TOKENS, MIN_TEMPERATURE,
};
pub use kernels::Tensor2D;
pub use model::{
    create_demo_model, create_demo_model_seeded, load_weights, parse_weights, GptConfig,
    LayerWeights, Linear, ModelWeights, NormWeights,
};
pub use tokenizer::{BpeCodec, CharCodec, Codec};
pub use utils::{argmax, Profiler};
pub use validation::{validate_model, TensorStats, ValidationReport};
