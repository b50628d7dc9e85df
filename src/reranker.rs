//! Second-stage reranking with a query/passage cross-encoder.
//!
//! Reranking reorders the retriever's candidates by relevance score,
//! descending. It is strictly best-effort: any scorer failure falls back
//! to the first-stage distance order.

use tracing::{debug, warn};

use crate::{error::Result, retriever::RetrievedCandidate};

/// Scores query/passage pairs jointly. One score per passage, higher is
/// more relevant; scores are not comparable with cosine distances.
pub trait PairScorer: Send + Sync {
    fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}

/// Rerank `candidates` against `query` and keep the best `top_k`.
///
/// On scorer failure (or a score count that does not match the candidate
/// count) the original distance order is kept, truncated to `top_k`.
pub fn rerank(
    scorer: &dyn PairScorer,
    query: &str,
    mut candidates: Vec<RetrievedCandidate>,
    top_k: usize,
) -> Vec<RetrievedCandidate> {
    if candidates.is_empty() {
        return candidates;
    }

    let texts: Vec<String> = candidates
        .iter()
        .map(|c| c.chunk.text.clone())
        .collect();

    let scores = match scorer.score(query, &texts) {
        Ok(scores) if scores.len() == candidates.len() => scores,
        Ok(scores) => {
            warn!(
                scores = scores.len(),
                candidates = candidates.len(),
                "scorer returned a mismatched score count, keeping distance order"
            );
            candidates.truncate(top_k);
            return candidates;
        }
        Err(e) => {
            warn!(error = %e, "reranking failed, keeping distance order");
            candidates.truncate(top_k);
            return candidates;
        }
    };

    for (candidate, score) in candidates.iter_mut().zip(&scores) {
        candidate.rerank_score = Some(*score);
    }

    // Descending by relevance, the opposite of the retriever's ascending
    // distance order.
    candidates.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_k);

    debug!(kept = candidates.len(), "reranked candidates");
    candidates
}
