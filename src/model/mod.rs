//! GPT model types and loading.

pub mod config;
pub mod demo;
pub mod loader;
pub mod weights;

pub use config::GptConfig;
pub use demo::{create_demo_model, create_demo_model_seeded, demo_vocab};
pub use loader::{load_weights, parse_weights, to_canonical_json, weights_from_value, WeightLayout};
pub use weights::{LayerWeights, Linear, ModelWeights, NormWeights};
