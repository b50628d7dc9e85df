//! Shared test doubles for the dependency-injected seams.

use std::sync::Mutex;

use crate::{
    embedder::Encoder,
    error::{Error, Result},
    generation::GenerationService,
    loader::DocumentLoader,
    reranker::PairScorer,
    tokenize::LengthOracle,
};

/// Length oracle that treats whitespace-separated words as tokens.
pub struct WordOracle;

impl LengthOracle for WordOracle {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> Result<String> {
        Ok(text
            .split_whitespace()
            .take(max_tokens)
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn tail_tokens(&self, text: &str, n_tokens: usize) -> Result<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let start = words.len().saturating_sub(n_tokens);
        Ok(words[start..].join(" "))
    }
}

/// Encoder producing deterministic vectors from word-count features.
///
/// Texts sharing words get nearby vectors, which is enough structure for
/// ranking assertions without a real model.
pub struct HashEncoder {
    pub dimension: usize,
}

impl Default for HashEncoder {
    fn default() -> Self {
        Self { dimension: 8 }
    }
}

impl Encoder for HashEncoder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dimension];
                for word in text.split_whitespace() {
                    let mut h = 0usize;
                    for b in word.bytes() {
                        h = h.wrapping_mul(31).wrapping_add(b as usize);
                    }
                    v[h % self.dimension] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Encoder that always fails, for degradation tests.
pub struct FailingEncoder;

impl Encoder for FailingEncoder {
    fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding("encoder unavailable".into()))
    }
}

/// Pair scorer returning a fixed score sequence, cycling if needed.
pub struct StaticScorer {
    pub scores: Vec<f32>,
}

impl PairScorer for StaticScorer {
    fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>> {
        Ok((0..texts.len())
            .map(|i| self.scores[i % self.scores.len()])
            .collect())
    }
}

/// Pair scorer that always fails, for fallback tests.
pub struct FailingScorer;

impl PairScorer for FailingScorer {
    fn score(&self, _query: &str, _texts: &[String]) -> Result<Vec<f32>> {
        Err(Error::Embedding("scorer unavailable".into()))
    }
}

/// Generation service that records every prompt it receives.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub reply: String,
}

impl RecordingGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        }
    }
}

impl GenerationService for RecordingGenerator {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Generation service that always fails.
pub struct FailingGenerator;

impl GenerationService for FailingGenerator {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::Generation("model endpoint unreachable".into()))
    }
}

/// Loader that serves a canned paragraph list for any path.
pub struct StubLoader {
    pub paragraphs: Vec<String>,
}

impl DocumentLoader for StubLoader {
    fn load(&self, _path: &std::path::Path) -> Result<Vec<String>> {
        Ok(self.paragraphs.clone())
    }
}
