//! Inference and text generation.

pub mod context;
pub mod engine;
pub mod generator;
pub mod sampling;

pub use context::Context;
pub use engine::InferenceEngine;
pub use generator::{generate, LanguageModel, TextGenerator, TokenStream, MAX_NEW_TOKENS};
pub use sampling::{Sampler, SamplingParams, MIN_TEMPERATURE};
