//! Central error types for gpt-oxidized.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GptError {
    /// Missing or malformed required field in a weight or tokenizer document.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Shape mismatch in {field}: expected {expected}, got {actual}")]
    ShapeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported tokenizer model: {0}")]
    UnsupportedModel(String),

    #[error("Token {id} out of vocabulary range (vocab_size = {vocab_size})")]
    InvalidToken { id: usize, vocab_size: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GptError {
    pub(crate) fn shape(
        field: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        GptError::ShapeMismatch {
            field: field.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
