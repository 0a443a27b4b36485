//! Dense f32 compute kernels for the transformer forward pass.

pub mod attention;
pub mod cpu;
pub mod tensor;

pub use attention::{causal_attention_probs, causal_self_attention};
pub use cpu::{
    add_bias, dot, gelu, gelu_tensor, layer_norm, linear, matmul, softmax, LAYER_NORM_EPS,
};
pub use tensor::Tensor2D;
