//! Byte-level BPE codec reading HuggingFace-style `tokenizer.json` documents.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::Codec;
use crate::errors::GptError;

/// Fallback unknown token when `model.unk_token` is not set.
pub const DEFAULT_UNK: &str = "<unk>";

/// GPT-2 byte ↔ visible character table.
///
/// Bytes `33..=126`, `161..=172` and `174..=255` map to the same codepoint;
/// the remaining bytes, ascending, map to `U+0100` onwards.
pub fn bytes_to_unicode() -> [char; 256] {
    let mut table = ['\0'; 256];
    let mut next = 256u32;
    for b in 0..=255u8 {
        let keeps_codepoint = matches!(b, 33..=126 | 161..=172 | 174..=255);
        let cp = if keeps_codepoint {
            b as u32
        } else {
            let cp = next;
            next += 1;
            cp
        };
        // every value here is < 0x144, always a valid scalar
        table[b as usize] = char::from_u32(cp).unwrap_or('\u{FFFD}');
    }
    table
}

#[derive(Debug, Deserialize)]
struct TokenizerDocument {
    model: Option<ModelSection>,
}

#[derive(Debug, Deserialize)]
struct ModelSection {
    #[serde(rename = "type")]
    kind: Option<String>,
    vocab: Option<HashMap<String, usize>>,
    merges: Option<Vec<Value>>,
    unk_token: Option<String>,
}

/// One merge rule as written in the document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MergeEntry {
    Pair(Vec<String>),
    Joined(String),
}

impl MergeEntry {
    fn into_pair(self) -> Option<(String, String)> {
        match self {
            MergeEntry::Pair(v) => {
                let mut it = v.into_iter();
                match (it.next(), it.next(), it.next()) {
                    (Some(a), Some(b), None) => Some((a, b)),
                    _ => None,
                }
            }
            MergeEntry::Joined(s) => s
                .split_once(' ')
                .map(|(a, b)| (a.to_string(), b.to_string())),
        }
    }
}

/// Byte-level BPE encoder/decoder.
#[derive(Debug, Clone)]
pub struct BpeCodec {
    encoder: HashMap<String, usize>,
    decoder: HashMap<usize, String>,
    /// first symbol → second symbol → rank (0 = highest priority)
    ranks: HashMap<String, HashMap<String, usize>>,
    num_merges: usize,
    unk_id: Option<usize>,
    byte_encoder: [char; 256],
    byte_decoder: HashMap<char, u8>,
}

impl BpeCodec {
    /// Load a tokenizer document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GptError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let codec = Self::from_json_str(&text)?;
        debug!(
            "Loaded BPE tokenizer {} ({} tokens, {} merges)",
            path.display(),
            codec.encoder.len(),
            codec.num_merges
        );
        Ok(codec)
    }

    pub fn from_json_str(json: &str) -> Result<Self, GptError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Build from a parsed `tokenizer.json` value.
    ///
    /// Merge rank is list position. A pair listed more than once keeps the
    /// rank of its first listing and later repeats are ignored, so a
    /// non-conforming file still ranks every pair deterministically.
    pub fn from_value(doc: Value) -> Result<Self, GptError> {
        let doc: TokenizerDocument = serde_json::from_value(doc)
            .map_err(|e| GptError::Config(format!("tokenizer document: {}", e)))?;
        let model = doc
            .model
            .ok_or_else(|| GptError::Config("missing key 'model'".into()))?;

        match model.kind.as_deref() {
            Some("BPE") => {}
            other => {
                return Err(GptError::UnsupportedModel(
                    other.unwrap_or("unknown").to_string(),
                ))
            }
        }

        let encoder = model
            .vocab
            .ok_or_else(|| GptError::Config("missing key 'model.vocab'".into()))?;
        let mut decoder = HashMap::with_capacity(encoder.len());
        for (token, &id) in &encoder {
            if let Some(prev) = decoder.insert(id, token.clone()) {
                return Err(GptError::Config(format!(
                    "model.vocab: id {} is used by both {:?} and {:?}",
                    id, prev, token
                )));
            }
        }

        let merges = model
            .merges
            .ok_or_else(|| GptError::Config("missing key 'model.merges'".into()))?;
        let num_merges = merges.len();
        let mut ranks: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for (rank, entry) in merges.into_iter().enumerate() {
            let (a, b) = serde_json::from_value::<MergeEntry>(entry)
                .ok()
                .and_then(MergeEntry::into_pair)
                .ok_or_else(|| {
                    GptError::Config(format!(
                        "model.merges[{}]: expected [\"A\", \"B\"] or \"A B\"",
                        rank
                    ))
                })?;
            ranks.entry(a).or_default().entry(b).or_insert(rank);
        }

        let unk_id = model
            .unk_token
            .as_deref()
            .and_then(|t| encoder.get(t))
            .or_else(|| encoder.get(DEFAULT_UNK))
            .copied();

        let byte_encoder = bytes_to_unicode();
        let byte_decoder = byte_encoder
            .iter()
            .enumerate()
            .map(|(b, &c)| (c, b as u8))
            .collect();

        Ok(Self {
            encoder,
            decoder,
            ranks,
            num_merges,
            unk_id,
            byte_encoder,
            byte_decoder,
        })
    }

    pub fn unk_id(&self) -> Option<usize> {
        self.unk_id
    }

    pub fn token_to_id(&self, token: &str) -> Option<usize> {
        self.encoder.get(token).copied()
    }

    pub fn id_to_token(&self, id: usize) -> Option<&str> {
        self.decoder.get(&id).map(String::as_str)
    }

    fn rank(&self, a: &str, b: &str) -> Option<usize> {
        self.ranks.get(a).and_then(|m| m.get(b)).copied()
    }

    /// Apply merges to a symbol sequence until no adjacent pair is ranked.
    fn merge_symbols(&self, mut symbols: Vec<String>) -> Vec<String> {
        while symbols.len() > 1 {
            let best = symbols
                .windows(2)
                .filter_map(|w| self.rank(&w[0], &w[1]).map(|r| (r, &w[0], &w[1])))
                .min_by_key(|(r, _, _)| *r)
                .map(|(_, a, b)| (a.clone(), b.clone()));
            let Some((first, second)) = best else {
                break;
            };

            let mut merged = Vec::with_capacity(symbols.len());
            let mut i = 0;
            while i < symbols.len() {
                if i + 1 < symbols.len() && symbols[i] == first && symbols[i + 1] == second {
                    merged.push(format!("{}{}", first, second));
                    i += 2;
                } else {
                    merged.push(std::mem::take(&mut symbols[i]));
                    i += 1;
                }
            }
            symbols = merged;
        }
        symbols
    }

    /// BPE symbols for raw bytes, before vocabulary lookup.
    pub fn tokenize_bytes(&self, bytes: &[u8]) -> Vec<String> {
        let symbols = bytes
            .iter()
            .map(|&b| self.byte_encoder[b as usize].to_string())
            .collect();
        self.merge_symbols(symbols)
    }

    pub fn encode_bytes(&self, bytes: &[u8]) -> Vec<usize> {
        let mut dropped = 0usize;
        let ids = self
            .tokenize_bytes(bytes)
            .into_iter()
            .filter_map(|sym| match self.token_to_id(&sym) {
                Some(id) => Some(id),
                None => {
                    if self.unk_id.is_none() {
                        dropped += 1;
                    }
                    self.unk_id
                }
            })
            .collect();
        if dropped > 0 {
            warn!("Dropped {} symbols missing from the BPE vocabulary", dropped);
        }
        ids
    }

    /// Raw bytes for `ids`; unknown ids and unmapped characters are skipped.
    pub fn decode_bytes(&self, ids: &[usize]) -> Vec<u8> {
        ids.iter()
            .filter_map(|&id| self.id_to_token(id))
            .flat_map(str::chars)
            .filter_map(|c| self.byte_decoder.get(&c).copied())
            .collect()
    }
}

impl Codec for BpeCodec {
    fn encode(&self, text: &str) -> Vec<usize> {
        self.encode_bytes(text.as_bytes())
    }

    fn decode(&self, ids: &[usize]) -> String {
        String::from_utf8_lossy(&self.decode_bytes(ids)).into_owned()
    }

    /// One past the largest id in the vocabulary.
    fn vocab_size(&self) -> usize {
        self.decoder.keys().max().map_or(0, |m| m + 1)
    }
}
