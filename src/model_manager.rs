//! Lazy lifecycle for the ONNX embedding and reranking models.
//!
//! Both fastembed models are loaded on first use and cached for the life
//! of the process; model files are downloaded into the data directory's
//! `models/` subdirectory on first run. Inference takes `&mut` on the
//! underlying models, so each one sits behind a `Mutex` held for the
//! whole call: concurrent embedding batches serialize here, one model
//! instance per process. Batch-level parallelism only overlaps with an
//! [`Encoder`] whose `encode` is itself safe for concurrent calls.

use std::{
    path::PathBuf,
    sync::Mutex,
};

use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, TextEmbedding,
    TextRerank,
};
use tracing::info;

use crate::{
    embedder::Encoder,
    error::{Error, Result},
    reranker::PairScorer,
};

pub struct ModelManager {
    cache_dir: PathBuf,
    show_download_progress: bool,
    embedding: Mutex<Option<TextEmbedding>>,
    rerank: Mutex<Option<TextRerank>>,
}

impl ModelManager {
    pub fn new(cache_dir: PathBuf, show_download_progress: bool) -> Self {
        Self {
            cache_dir,
            show_download_progress,
            embedding: Mutex::new(None),
            rerank: Mutex::new(None),
        }
    }
}

impl Encoder for ModelManager {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut guard = self
            .embedding
            .lock()
            .map_err(|_| Error::Embedding("embedding model lock poisoned".into()))?;

        if guard.is_none() {
            info!(model = "all-MiniLM-L6-v2", "loading embedding model");
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                    .with_cache_dir(self.cache_dir.clone())
                    .with_show_download_progress(self.show_download_progress),
            )
            .map_err(|e| Error::Embedding(e.to_string()))?;
            *guard = Some(model);
        }

        let model = guard
            .as_mut()
            .ok_or_else(|| Error::Embedding("embedding model unavailable".into()))?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Embedding(e.to_string()))
    }
}

impl PairScorer for ModelManager {
    fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let mut guard = self
            .rerank
            .lock()
            .map_err(|_| Error::Embedding("rerank model lock poisoned".into()))?;

        if guard.is_none() {
            info!(model = "bge-reranker-base", "loading rerank model");
            let model = TextRerank::try_new(
                RerankInitOptions::new(RerankerModel::BGERerankerBase)
                    .with_cache_dir(self.cache_dir.clone())
                    .with_show_download_progress(self.show_download_progress),
            )
            .map_err(|e| Error::Embedding(e.to_string()))?;
            *guard = Some(model);
        }

        let model = guard
            .as_mut()
            .ok_or_else(|| Error::Embedding("rerank model unavailable".into()))?;

        let documents: Vec<&str> = texts.iter().map(String::as_str).collect();
        let results = model
            .rerank(query, documents, false, None)
            .map_err(|e| Error::Embedding(e.to_string()))?;

        // Results arrive sorted by score; restore input order so the
        // caller can zip scores back onto its candidates.
        let mut scores = vec![0.0f32; texts.len()];
        for result in results {
            let slot = scores.get_mut(result.index).ok_or_else(|| {
                Error::Embedding(format!(
                    "rerank result index {} out of range",
                    result.index
                ))
            })?;
            *slot = result.score;
        }

        Ok(scores)
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}
