//! Token-budgeted, device-aware batch embedding.
//!
//! Inputs are grouped into [`BatchPlan`]s whose cumulative token count
//! stays under a per-device budget, then each batch is pushed through the
//! encoder. On CPU the batches are dispatched to a rayon worker pool; on
//! an accelerator they run sequentially to avoid contending for the
//! device. How much actually overlaps is the encoder's affair: one that
//! locks per call (the fastembed-backed production encoder does) degrades
//! to serial execution without affecting results. Output is always
//! reassembled in original input order.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    config::DevicePolicy,
    error::{Error, Result},
    tokenize::LengthOracle,
};

/// Raw text-to-vector backend. One vector per input, order-preserving.
pub trait Encoder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A scheduling artifact: one encoder call worth of texts.
///
/// `first_index` is the position of the batch's first text in the
/// original input, used to verify reassembly order.
struct BatchPlan {
    first_index: usize,
    texts: Vec<String>,
}

pub struct BatchedEmbedder {
    encoder: Arc<dyn Encoder>,
    oracle: Arc<dyn LengthOracle>,
    model_max_tokens: usize,
    max_tokens_per_batch: usize,
    parallel: bool,
}

impl BatchedEmbedder {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        oracle: Arc<dyn LengthOracle>,
        model_max_tokens: usize,
        device: DevicePolicy,
    ) -> Self {
        // The budget must admit at least one maximum-length input.
        let max_tokens_per_batch =
            device.max_tokens_per_batch(model_max_tokens).max(model_max_tokens);

        Self {
            encoder,
            oracle,
            model_max_tokens,
            max_tokens_per_batch,
            parallel: device.parallel_batches(),
        }
    }

    pub fn model_max_tokens(&self) -> usize {
        self.model_max_tokens
    }

    /// Embed `texts`, one vector per input, in input order.
    ///
    /// Inputs over the model maximum are truncated (lossy, logged) before
    /// batching. A failure in any batch fails the whole call: a partial
    /// result set would corrupt id-to-vector alignment downstream.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let plans = self.plan_batches(texts)?;
        debug!(inputs = texts.len(), batches = plans.len(), "embedding");

        let batches: Vec<Vec<Vec<f32>>> = if self.parallel {
            plans
                .par_iter()
                .map(|plan| self.run_batch(plan))
                .collect::<Result<_>>()?
        } else {
            plans
                .iter()
                .map(|plan| self.run_batch(plan))
                .collect::<Result<_>>()?
        };

        let mut vectors = Vec::with_capacity(texts.len());
        for (plan, batch) in plans.iter().zip(batches) {
            debug_assert_eq!(vectors.len(), plan.first_index);
            vectors.extend(batch);
        }

        Ok(vectors)
    }

    fn run_batch(&self, plan: &BatchPlan) -> Result<Vec<Vec<f32>>> {
        let vectors = self.encoder.encode(&plan.texts)?;
        if vectors.len() != plan.texts.len() {
            return Err(Error::Embedding(format!(
                "encoder returned {} vectors for {} inputs",
                vectors.len(),
                plan.texts.len()
            )));
        }
        Ok(vectors)
    }

    fn plan_batches(&self, texts: &[String]) -> Result<Vec<BatchPlan>> {
        let mut plans = Vec::new();
        let mut batch: Vec<String> = Vec::new();
        let mut batch_tokens = 0usize;
        let mut batch_start = 0usize;

        for (index, text) in texts.iter().enumerate() {
            let mut text = text.clone();
            let mut tokens = self.oracle.count_tokens(&text)?;

            if tokens > self.model_max_tokens {
                warn!(
                    tokens,
                    limit = self.model_max_tokens,
                    "truncating oversized embedding input"
                );
                text = self.oracle.truncate(&text, self.model_max_tokens)?;
                tokens = self.model_max_tokens;
            }

            if !batch.is_empty()
                && batch_tokens + tokens > self.max_tokens_per_batch
            {
                plans.push(BatchPlan {
                    first_index: batch_start,
                    texts: std::mem::take(&mut batch),
                });
                batch_tokens = 0;
                batch_start = index;
            }

            batch.push(text);
            batch_tokens += tokens;
        }

        if !batch.is_empty() {
            plans.push(BatchPlan {
                first_index: batch_start,
                texts: batch,
            });
        }

        Ok(plans)
    }
}
