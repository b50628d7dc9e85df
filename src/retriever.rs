//! First-stage retrieval: embed the query, scan the vector store.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    embedder::BatchedEmbedder,
    error::{Error, Result},
    vector_store::{Chunk, VectorStore},
};

/// One retrieval hit, carrying both ranking signals.
///
/// `distance` is cosine distance (lower is closer); `rerank_score` is a
/// cross-encoder relevance score (higher is better) filled in only when
/// the reranking pass runs. The two are never comparable.
#[derive(Debug, Clone)]
pub struct RetrievedCandidate {
    pub chunk: Chunk,
    pub distance: f32,
    pub rerank_score: Option<f32>,
}

pub struct Retriever {
    embedder: Arc<BatchedEmbedder>,
    store: Arc<VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<BatchedEmbedder>, store: Arc<VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// The `top_k` stored chunks nearest to `query`, best match first.
    ///
    /// Retrieval failures degrade to an empty candidate list so a broken
    /// index never blocks answer generation.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<RetrievedCandidate> {
        match self.try_retrieve(query, top_k) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    fn try_retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedCandidate>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&[query.to_string()])?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no vector for query".into()))?;

        let hits = self.store.query(&query_vector, top_k)?;
        debug!(query_len = query.len(), hits = hits.len(), "retrieved candidates");

        Ok(hits
            .into_iter()
            .map(|(chunk, distance)| RetrievedCandidate {
                chunk,
                distance,
                rerank_score: None,
            })
            .collect())
    }
}
