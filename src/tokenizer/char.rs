//! Character codec: one vocabulary entry per Unicode scalar.

use std::collections::HashMap;

use super::Codec;
use crate::model::ModelWeights;

/// Entry used as the unknown id when present; otherwise id 0 is used.
pub const CHAR_UNK: &str = "<unk>";

#[derive(Debug, Clone)]
pub struct CharCodec {
    stoi: HashMap<String, usize>,
    itos: Vec<String>,
    unk_id: usize,
}

impl CharCodec {
    /// Entry `i` of `vocab` gets id `i`. An entry repeated in the list
    /// encodes to its first index; every index still decodes to its entry.
    pub fn new(vocab: Vec<String>) -> Self {
        let mut stoi = HashMap::with_capacity(vocab.len());
        for (i, s) in vocab.iter().enumerate() {
            stoi.entry(s.clone()).or_insert(i);
        }
        let unk_id = stoi.get(CHAR_UNK).copied().unwrap_or(0);
        Self {
            stoi,
            itos: vocab,
            unk_id,
        }
    }

    /// Codec for the vocab list carried by a weight document, if any.
    pub fn from_weights(weights: &ModelWeights) -> Option<Self> {
        weights.vocab.clone().map(Self::new)
    }

    pub fn unk_id(&self) -> usize {
        self.unk_id
    }
}

impl Codec for CharCodec {
    /// Characters missing from the vocabulary silently become the unknown id.
    fn encode(&self, text: &str) -> Vec<usize> {
        let mut buf = [0u8; 4];
        text.chars()
            .map(|c| {
                let key: &str = c.encode_utf8(&mut buf);
                self.stoi.get(key).copied().unwrap_or(self.unk_id)
            })
            .collect()
    }

    fn decode(&self, ids: &[usize]) -> String {
        ids.iter()
            .filter_map(|&id| self.itos.get(id))
            .map(String::as_str)
            .collect()
    }

    fn vocab_size(&self) -> usize {
        self.itos.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CharCodec {
        CharCodec::new(
            ["<unk>", "a", "b", "é", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn encodes_unicode_scalars() {
        let c = codec();
        assert_eq!(c.encode("ab é"), vec![1, 2, 4, 3]);
    }

    #[test]
    fn unknown_chars_fall_back_to_unk() {
        let c = codec();
        assert_eq!(c.unk_id(), 0);
        assert_eq!(c.encode("axb"), vec![1, 0, 2]);
    }

    #[test]
    fn unk_defaults_to_zero_without_entry() {
        let c = CharCodec::new(vec!["x".into(), "y".into()]);
        assert_eq!(c.encode("yz"), vec![1, 0]);
    }

    #[test]
    fn decode_skips_unknown_ids() {
        let c = codec();
        assert_eq!(c.decode(&[1, 42, 3, 2]), "aéb");
        assert_eq!(c.decode(&c.encode("ba é")), "ba é");
    }

    #[test]
    fn repeated_entry_encodes_to_first_index() {
        let c = CharCodec::new(vec!["<unk>".into(), "a".into(), "b".into(), "a".into()]);
        assert_eq!(c.encode("ba"), vec![2, 1]);
        assert_eq!(c.decode(&[3, 1]), "aa");
        assert_eq!(c.vocab_size(), 4);
    }

    #[test]
    fn demo_weights_carry_a_vocab() {
        let w = crate::model::create_demo_model_seeded(0);
        let c = CharCodec::from_weights(&w).unwrap();
        assert_eq!(c.vocab_size(), w.vocab_size());
        assert_eq!(c.decode(&c.encode("Hello!")), "Hello!");
    }
}
