//! Splits paragraph text into overlapping, length-bounded chunks.
//!
//! Paragraphs that fit the model's maximum sequence length pass through
//! unchanged. Longer paragraphs are split on UAX #29 sentence boundaries
//! and sentences are greedily grouped under the token budget; trailing
//! tokens of a closed chunk seed the next group so the model sees some
//! continuity across the boundary.

use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::{error::Result, tokenize::LengthOracle};

/// Chunk a list of paragraphs into embeddable text segments.
///
/// Every returned chunk counts at most `model_max_tokens` tokens per the
/// oracle. A sentence that alone exceeds the budget is hard-truncated;
/// information loss there is accepted and logged, never fatal. Sentence
/// boundaries otherwise always win over mid-sentence breaks.
///
/// UAX #29 keeps lowercase continuations attached to the preceding
/// sentence, so an oversized all-lowercase paragraph (logs, code text)
/// has no detectable boundaries and degrades to the truncation path.
///
/// `overlap_tokens = 0` disables continuity: each group starts clean.
pub fn chunk_paragraphs(
    paragraphs: &[String],
    oracle: &dyn LengthOracle,
    model_max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<String>> {
    let mut chunks = Vec::new();
    let mut truncated_sentences = 0usize;

    for para in paragraphs {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let para_tokens = oracle.count_tokens(para)?;
        if para_tokens <= model_max_tokens {
            chunks.push(para.to_string());
            continue;
        }

        debug!(
            tokens = para_tokens,
            limit = model_max_tokens,
            "paragraph exceeds model limit, splitting by sentences"
        );

        let mut group: Vec<String> = Vec::new();
        let mut group_tokens = 0usize;

        for sentence in para.unicode_sentences() {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }

            let mut sentence = sentence.to_string();
            let mut sentence_tokens = oracle.count_tokens(&sentence)?;

            // Single oversized sentence: the one case where we break
            // mid-sentence.
            if sentence_tokens > model_max_tokens {
                debug!(tokens = sentence_tokens, "truncating oversized sentence");
                sentence = oracle.truncate(&sentence, model_max_tokens)?;
                sentence_tokens = oracle.count_tokens(&sentence)?;
                truncated_sentences += 1;
            }

            if !group.is_empty()
                && group_tokens + sentence_tokens > model_max_tokens
            {
                let chunk = group.join(" ");
                group.clear();
                group_tokens = 0;

                // Carry the closed chunk's tail into the next group, unless
                // tail + sentence would itself break the token bound.
                if overlap_tokens > 0 {
                    let tail = oracle.tail_tokens(&chunk, overlap_tokens)?;
                    let tail_tokens = oracle.count_tokens(&tail)?;
                    if tail_tokens + sentence_tokens <= model_max_tokens {
                        group_tokens = tail_tokens;
                        group = vec![tail];
                    }
                }

                chunks.push(chunk);
            }

            group_tokens += sentence_tokens;
            group.push(sentence);
        }

        if !group.is_empty() {
            chunks.push(group.join(" "));
        }
    }

    if truncated_sentences > 0 {
        warn!(
            count = truncated_sentences,
            "hard-truncated sentences exceeding the model maximum"
        );
    }

    Ok(chunks)
}
