//! Runtime settings for the pipeline.
//!
//! Every field has a sensible default and can be overridden through a
//! `RAGPIPE_*` environment variable, so the CLI works without a config file.

use std::{path::PathBuf, str::FromStr};

/// Batch-sizing and scheduling policy derived from the compute device.
///
/// This is a performance policy, not a correctness one: any bounded
/// per-batch token budget satisfies the embedding contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePolicy {
    /// CPU-only execution: small batches, processed in parallel across cores.
    Cpu,
    /// A single accelerator (CUDA/Metal): large batches, processed
    /// sequentially to avoid device contention.
    Accelerated,
}

impl DevicePolicy {
    /// Maximum cumulative tokens per embedding batch for this device.
    pub fn max_tokens_per_batch(self, model_max_tokens: usize) -> usize {
        match self {
            DevicePolicy::Cpu => 2048.min(model_max_tokens * 4),
            DevicePolicy::Accelerated => 8192.min(model_max_tokens * 8),
        }
    }

    /// Whether independent batches may run on separate worker threads.
    pub fn parallel_batches(self) -> bool {
        matches!(self, DevicePolicy::Cpu)
    }
}

impl FromStr for DevicePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(DevicePolicy::Cpu),
            "accelerated" | "gpu" | "cuda" | "metal" | "mps" => {
                Ok(DevicePolicy::Accelerated)
            }
            other => Err(format!("unknown device policy: {other}")),
        }
    }
}

/// Centralized configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Name of the persistent vector collection.
    pub collection_name: String,
    /// Explicit path to a `tokenizer.json`; defaults to
    /// `<data-dir>/models/tokenizer.json` when unset.
    pub tokenizer_file: Option<PathBuf>,
    /// Maximum sequence length of the embedding model, in tokens.
    pub model_max_tokens: usize,
    /// Tokens of trailing context carried between consecutive chunks.
    pub overlap_tokens: usize,
    /// Minimum paragraph length (characters) accepted by the loader.
    pub min_paragraph_chars: usize,
    /// Number of candidates fetched from the vector store per query.
    pub top_k: usize,
    /// Whether to run the cross-encoder reranking pass.
    pub enable_rerank: bool,
    /// Number of candidates kept after reranking.
    pub rerank_top_k: usize,
    /// Compute device policy for batch embedding.
    pub device: DevicePolicy,
    /// Base URL of the Ollama generation service.
    pub ollama_base_url: String,
    /// Ollama model used for answer generation.
    pub ollama_model: String,
    /// Sampling temperature passed to the generation service.
    pub temperature: f32,
    /// Capacity of the LRU answer cache (0 disables caching).
    pub answer_cache_capacity: usize,
    /// Show model download progress on first use.
    pub show_download_progress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection_name: "rag_documents".to_string(),
            tokenizer_file: None,
            model_max_tokens: 512,
            overlap_tokens: 50,
            min_paragraph_chars: 20,
            top_k: 5,
            enable_rerank: true,
            rerank_top_k: 5,
            device: DevicePolicy::Cpu,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            temperature: 0.2,
            answer_cache_capacity: 128,
            show_download_progress: false,
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    ///
    /// Malformed values are ignored rather than fatal; the pipeline
    /// should start with defaults instead of refusing to run.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            collection_name: env_string("RAGPIPE_COLLECTION", defaults.collection_name),
            tokenizer_file: std::env::var("RAGPIPE_TOKENIZER").ok().map(PathBuf::from),
            model_max_tokens: env_parse("RAGPIPE_MODEL_MAX_TOKENS", defaults.model_max_tokens),
            overlap_tokens: env_parse("RAGPIPE_OVERLAP_TOKENS", defaults.overlap_tokens),
            min_paragraph_chars: env_parse(
                "RAGPIPE_MIN_PARAGRAPH_CHARS",
                defaults.min_paragraph_chars,
            ),
            top_k: env_parse("RAGPIPE_TOP_K", defaults.top_k),
            enable_rerank: env_parse("RAGPIPE_ENABLE_RERANK", defaults.enable_rerank),
            rerank_top_k: env_parse("RAGPIPE_RERANK_TOP_K", defaults.rerank_top_k),
            device: env_parse("RAGPIPE_DEVICE", defaults.device),
            ollama_base_url: env_string("RAGPIPE_OLLAMA_URL", defaults.ollama_base_url),
            ollama_model: env_string("RAGPIPE_OLLAMA_MODEL", defaults.ollama_model),
            temperature: env_parse("RAGPIPE_TEMPERATURE", defaults.temperature),
            answer_cache_capacity: env_parse(
                "RAGPIPE_ANSWER_CACHE",
                defaults.answer_cache_capacity,
            ),
            show_download_progress: env_parse("RAGPIPE_DOWNLOAD_PROGRESS", false),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
