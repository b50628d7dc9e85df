//! Prompt assembly for the generation model.

use crate::retriever::RetrievedCandidate;

/// The shape of prompt handed to the generation model.
///
/// The choice is made once, from whether retrieval produced any context,
/// and rendering follows that decision. Generation always proceeds: an
/// empty index degrades to a context-free question, never to a refusal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Retrieved chunks are available and should ground the answer.
    WithContext { context: String },
    /// Nothing was retrieved; ask the model directly.
    ContextFree,
}

impl Prompt {
    /// Decide the prompt shape from the final candidate list.
    ///
    /// Context is the candidate texts in their ranked order, joined by
    /// blank lines.
    pub fn for_candidates(candidates: &[RetrievedCandidate]) -> Self {
        if candidates.is_empty() {
            return Prompt::ContextFree;
        }
        let context = candidates
            .iter()
            .map(|c| c.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Prompt::WithContext { context }
    }

    /// Render the final prompt string for `question`.
    pub fn render(&self, question: &str) -> String {
        match self {
            Prompt::WithContext { context } => format!(
                "Use the following context to answer the question:\n\n\
                 {context}\n\n\
                 Question: {question}\n\
                 Answer:"
            ),
            Prompt::ContextFree => question.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::Chunk;

    fn candidate(text: &str) -> RetrievedCandidate {
        RetrievedCandidate {
            chunk: Chunk {
                id: format!("t-{text}"),
                text: text.to_string(),
                source: "t.txt".to_string(),
                sequence_index: 0,
            },
            distance: 0.0,
            rerank_score: None,
        }
    }

    #[test]
    fn no_candidates_means_context_free() {
        let prompt = Prompt::for_candidates(&[]);
        assert_eq!(prompt, Prompt::ContextFree);
        assert_eq!(prompt.render("Why is the sky blue?"), "Why is the sky blue?");
    }

    #[test]
    fn candidates_are_joined_in_ranked_order() {
        let prompt =
            Prompt::for_candidates(&[candidate("first"), candidate("second")]);

        let rendered = prompt.render("What order?");
        assert!(rendered.starts_with("Use the following context"));
        assert!(rendered.contains("first\n\nsecond"));
        assert!(rendered.contains("Question: What order?\nAnswer:"));
        assert!(
            rendered.find("first").unwrap() < rendered.find("second").unwrap()
        );
    }
}
