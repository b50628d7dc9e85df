//! Token counting and token-boundary truncation.
//!
//! Chunking and batch planning never look at the model directly; they go
//! through [`LengthOracle`], which abstracts over the embedding model's
//! native segmentation units. The production implementation wraps a
//! HuggingFace `tokenizer.json`; tests substitute a cheap word-based double.

use std::path::Path;

use tokenizers::Tokenizer;

use crate::error::{Error, Result};

/// Deterministic token accounting for a fixed model configuration.
pub trait LengthOracle: Send + Sync {
    /// Number of tokens the model sees for `text`.
    fn count_tokens(&self, text: &str) -> Result<usize>;

    /// A prefix of `text` that decodes back to at most `max_tokens` tokens,
    /// preserving as much leading content as possible.
    fn truncate(&self, text: &str, max_tokens: usize) -> Result<String>;

    /// The text of the trailing `n_tokens` tokens of `text`, used to seed
    /// overlap between consecutive chunks.
    fn tail_tokens(&self, text: &str, n_tokens: usize) -> Result<String>;
}

/// [`LengthOracle`] backed by a HuggingFace tokenizer file.
///
/// Construction fails when the tokenizer file is missing or malformed;
/// this is a fatal resource error and is never retried.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "tokenizer file not found: {} (set RAGPIPE_TOKENIZER)",
                path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(Self { tokenizer })
    }

    fn encode_ids(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::Tokenizer(e.to_string()))
    }
}

impl LengthOracle for HfTokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.encode_ids(text)?.len())
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> Result<String> {
        let ids = self.encode_ids(text)?;
        if ids.len() <= max_tokens {
            return Ok(text.to_string());
        }
        self.decode(&ids[..max_tokens])
    }

    fn tail_tokens(&self, text: &str, n_tokens: usize) -> Result<String> {
        let ids = self.encode_ids(text)?;
        let start = ids.len().saturating_sub(n_tokens);
        self.decode(&ids[start..])
    }
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer").finish_non_exhaustive()
    }
}
