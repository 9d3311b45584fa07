//! Exact token counting for the chunker.
//!
//! This is deliberately separate from [`crate::estimate_tokens`], the cheap
//! `chars / 4` heuristic used by job memory.

use tiktoken_rs::CoreBPE;

use super::DocumentError;

/// Longest run of tokens that may encode a single character.
const MAX_TOKENS_PER_CHAR: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode tokens back to text. Partial characters at the edges of the
    /// slice are replaced with U+FFFD.
    fn decode(&self, tokens: &[u32]) -> String;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// `cl100k_base` BPE, the encoding used by the OpenAI embedding models.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoding", &"cl100k_base")
            .finish()
    }
}

impl TiktokenCounter {
    /// # Errors
    ///
    /// Returns `DocumentError::Tokenizer` if the BPE ranks fail to load.
    pub fn cl100k() -> Result<Self, DocumentError> {
        let bpe =
            tiktoken_rs::cl100k_base().map_err(|e| DocumentError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }

    /// Decode the shortest valid run at each position. A token that starts no
    /// valid run becomes a single U+FFFD and decoding resumes after it.
    fn decode_lossy(&self, tokens: &[u32]) -> String {
        let mut out = String::new();
        let mut start = 0;
        while start < tokens.len() {
            let limit = (start + MAX_TOKENS_PER_CHAR).min(tokens.len());
            let decoded = (start + 1..=limit).find_map(|end| {
                self.bpe
                    .decode(tokens[start..end].to_vec())
                    .ok()
                    .map(|s| (end, s))
            });
            match decoded {
                Some((end, s)) => {
                    out.push_str(&s);
                    start = end;
                }
                None => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    start += 1;
                }
            }
        }
        out
    }
}

impl TokenCounter for TiktokenCounter {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> String {
        match self.bpe.decode(tokens.to_vec()) {
            Ok(s) => s,
            Err(_) => self.decode_lossy(tokens),
        }
    }
}
