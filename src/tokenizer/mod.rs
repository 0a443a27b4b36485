//! Text ↔ token id codecs.

pub mod bpe;
pub mod char;

pub use self::bpe::{bytes_to_unicode, BpeCodec};
pub use self::char::CharCodec;

/// Common encode/decode surface so callers can swap front-ends.
pub trait Codec {
    fn encode(&self, text: &str) -> Vec<usize>;

    fn decode(&self, ids: &[usize]) -> String;

    fn vocab_size(&self) -> usize;
}
