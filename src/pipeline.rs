//! End-to-end orchestration: ingestion and question answering.
//!
//! The pipeline owns the collaborator seams (length oracle, encoder,
//! scorer, loader, generation service) behind trait objects so the whole
//! flow is testable without model weights or a running Ollama.

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use tracing::{info, warn};

use crate::{
    cache::AnswerCache,
    chunker::chunk_paragraphs,
    config::Settings,
    data_dir::DataDir,
    embedder::{BatchedEmbedder, Encoder},
    error::{Error, Result},
    generation::{GenerationService, OllamaClient},
    loader::{DocumentLoader, FsLoader},
    model_manager::ModelManager,
    prompt::Prompt,
    reranker::{PairScorer, rerank},
    retriever::Retriever,
    tokenize::{HfTokenizer, LengthOracle},
    vector_store::{Chunk, VectorStore},
};

/// Fixed reply returned when the generation model cannot be reached.
pub const GENERATION_FAILURE_REPLY: &str =
    "An error occurred while generating a response. Please try again.";

/// Summary of one document ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    pub paragraphs: usize,
    pub chunks_stored: usize,
    pub chunks_skipped: usize,
}

pub struct Pipeline {
    settings: Settings,
    oracle: Arc<dyn LengthOracle>,
    embedder: Arc<BatchedEmbedder>,
    store: Arc<VectorStore>,
    retriever: Retriever,
    scorer: Option<Arc<dyn PairScorer>>,
    loader: Arc<dyn DocumentLoader>,
    generator: Arc<dyn GenerationService>,
    cache: Mutex<AnswerCache>,
}

impl Pipeline {
    /// Open the production pipeline: HuggingFace tokenizer, fastembed
    /// models cached under the data directory, redb-backed collection,
    /// Ollama generation.
    pub fn open(settings: Settings, data_dir: &DataDir) -> Result<Self> {
        let models_dir = data_dir.models_dir()?;

        let tokenizer_file = match &settings.tokenizer_file {
            Some(path) => path.clone(),
            None => models_dir.join("tokenizer.json"),
        };
        let oracle: Arc<dyn LengthOracle> =
            Arc::new(HfTokenizer::from_file(&tokenizer_file)?);

        let models = Arc::new(ModelManager::new(
            models_dir,
            settings.show_download_progress,
        ));
        let scorer: Option<Arc<dyn PairScorer>> = settings
            .enable_rerank
            .then(|| models.clone() as Arc<dyn PairScorer>);

        let store = Arc::new(VectorStore::open(
            &data_dir.collection_db(&settings.collection_name)?,
        )?);

        let generator = Arc::new(OllamaClient::new(
            &settings.ollama_base_url,
            &settings.ollama_model,
            settings.temperature,
        )?);

        let loader = Arc::new(FsLoader::new(settings.min_paragraph_chars));

        Self::assemble(settings, oracle, models, scorer, store, loader, generator)
    }

    /// Wire a pipeline from explicit collaborators.
    pub fn assemble(
        settings: Settings,
        oracle: Arc<dyn LengthOracle>,
        encoder: Arc<dyn Encoder>,
        scorer: Option<Arc<dyn PairScorer>>,
        store: Arc<VectorStore>,
        loader: Arc<dyn DocumentLoader>,
        generator: Arc<dyn GenerationService>,
    ) -> Result<Self> {
        let embedder = Arc::new(BatchedEmbedder::new(
            encoder,
            oracle.clone(),
            settings.model_max_tokens,
            settings.device,
        ));
        let retriever = Retriever::new(embedder.clone(), store.clone());
        let cache = Mutex::new(AnswerCache::new(settings.answer_cache_capacity));

        Ok(Self {
            settings,
            oracle,
            embedder,
            store,
            retriever,
            scorer,
            loader,
            generator,
            cache,
        })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Ingest one document: load, chunk, embed, store.
    ///
    /// Chunks that come back empty after trimming are skipped with stats
    /// logged; a document with zero surviving chunks ingests successfully
    /// as a no-op. Embedding failure is fatal for the whole document so
    /// the store never holds a partial ingest.
    pub fn ingest_document(&self, path: &Path) -> Result<IngestReport> {
        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| Error::UnsupportedFile(path.to_path_buf()))?;

        let paragraphs = self.loader.load(path)?;
        let chunks = chunk_paragraphs(
            &paragraphs,
            self.oracle.as_ref(),
            self.settings.model_max_tokens,
            self.settings.overlap_tokens,
        )?;

        // Defensive re-check before storage: drop anything the chunker let
        // through empty or over the token budget. Ids carry the raw chunk
        // index, so skips leave visible gaps.
        let mut kept: Vec<(usize, String)> = Vec::new();
        let mut skipped_tokens: Vec<usize> = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let trimmed = chunk.trim();
            if trimmed.is_empty() {
                skipped_tokens.push(0);
                continue;
            }
            let tokens = self.oracle.count_tokens(trimmed)?;
            if tokens > self.settings.model_max_tokens {
                skipped_tokens.push(tokens);
            } else {
                kept.push((index, trimmed.to_string()));
            }
        }

        if !skipped_tokens.is_empty() {
            let min = skipped_tokens.iter().min().copied().unwrap_or(0);
            let max = skipped_tokens.iter().max().copied().unwrap_or(0);
            let avg =
                skipped_tokens.iter().sum::<usize>() as f64 / skipped_tokens.len() as f64;
            warn!(
                source = %source,
                count = skipped_tokens.len(),
                min_tokens = min,
                max_tokens = max,
                avg_tokens = avg,
                "skipped unembeddable chunks during ingestion"
            );
        }

        let report = IngestReport {
            source: source.clone(),
            paragraphs: paragraphs.len(),
            chunks_stored: kept.len(),
            chunks_skipped: skipped_tokens.len(),
        };

        if kept.is_empty() {
            info!(source = %source, "document produced no storable chunks");
            return Ok(report);
        }

        let texts: Vec<String> = kept.iter().map(|(_, t)| t.clone()).collect();
        let vectors = self.embedder.embed(&texts)?;

        let entries: Vec<(Chunk, Vec<f32>)> = kept
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(sequence_index, ((raw_index, text), vector))| {
                (
                    Chunk {
                        id: format!("{source}-{raw_index}"),
                        text,
                        source: source.clone(),
                        sequence_index,
                    },
                    vector,
                )
            })
            .collect();

        self.store.add_documents(&entries)?;
        info!(
            source = %source,
            chunks = report.chunks_stored,
            "ingested document"
        );

        Ok(report)
    }

    /// Answer a question against the ingested corpus.
    ///
    /// Retrieval and reranking degrade gracefully; only the cache and the
    /// generation call decide the returned string. A generation failure
    /// yields [`GENERATION_FAILURE_REPLY`], which is never cached.
    pub fn generate_answer(&self, question: &str) -> String {
        if let Ok(mut cache) = self.cache.lock()
            && let Some(answer) = cache.get(question)
        {
            return answer;
        }

        let mut candidates =
            self.retriever.retrieve(question, self.settings.top_k);

        if let Some(scorer) = &self.scorer
            && !candidates.is_empty()
        {
            candidates = rerank(
                scorer.as_ref(),
                question,
                candidates,
                self.settings.rerank_top_k,
            );
        }

        let prompt = Prompt::for_candidates(&candidates).render(question);

        match self.generator.complete(&prompt) {
            Ok(answer) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.put(question, answer.clone());
                }
                answer
            }
            Err(e) => {
                warn!(error = %e, "answer generation failed");
                GENERATION_FAILURE_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{
        FailingGenerator, HashEncoder, RecordingGenerator, StaticScorer,
        StubLoader, WordOracle,
    };

    fn test_pipeline(
        paragraphs: Vec<String>,
        scorer: Option<Arc<dyn PairScorer>>,
        generator: Arc<dyn GenerationService>,
    ) -> (tempfile::TempDir, Pipeline) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            Arc::new(VectorStore::open(&tmp.path().join("p.redb")).unwrap());

        let pipeline = Pipeline::assemble(
            Settings::default(),
            Arc::new(WordOracle),
            Arc::new(HashEncoder::default()),
            scorer,
            store,
            Arc::new(StubLoader { paragraphs }),
            generator,
        )
        .unwrap();

        (tmp, pipeline)
    }

    #[test]
    fn ingest_then_answer_uses_retrieved_context() {
        let generator = Arc::new(RecordingGenerator::replying("the answer"));
        let (_tmp, pipeline) = test_pipeline(
            vec!["the borrow checker enforces aliasing rules".to_string()],
            None,
            generator.clone(),
        );

        let report = pipeline
            .ingest_document(Path::new("notes.txt"))
            .unwrap();
        assert_eq!(report.chunks_stored, 1);

        let answer = pipeline.generate_answer("what does the borrow checker do");
        assert_eq!(answer, "the answer");

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Use the following context"));
        assert!(prompts[0].contains("borrow checker"));
    }

    #[test]
    fn empty_index_falls_back_to_context_free_prompt() {
        let generator = Arc::new(RecordingGenerator::replying("direct answer"));
        let (_tmp, pipeline) = test_pipeline(vec![], None, generator.clone());

        let answer = pipeline.generate_answer("why is the sky blue");
        assert_eq!(answer, "direct answer");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts[0], "why is the sky blue");
    }

    #[test]
    fn generation_failure_yields_the_fixed_reply_uncached() {
        let (_tmp, pipeline) =
            test_pipeline(vec![], None, Arc::new(FailingGenerator));

        assert_eq!(
            pipeline.generate_answer("anything"),
            GENERATION_FAILURE_REPLY
        );
        assert!(pipeline.cache.lock().unwrap().is_empty());
    }

    #[test]
    fn repeated_question_is_served_from_cache() {
        let generator = Arc::new(RecordingGenerator::replying("cached"));
        let (_tmp, pipeline) = test_pipeline(vec![], None, generator.clone());

        assert_eq!(pipeline.generate_answer("What is Rust?"), "cached");
        assert_eq!(pipeline.generate_answer("  what is RUST?"), "cached");

        // Second call must not reach the generator.
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn reranking_reorders_the_prompt_context() {
        let generator = Arc::new(RecordingGenerator::replying("ok"));
        let scorer = Arc::new(StaticScorer {
            scores: vec![0.1, 0.9],
        });
        let (_tmp, pipeline) = test_pipeline(
            vec![
                "alpha alpha alpha document text".to_string(),
                "beta beta beta document text".to_string(),
            ],
            Some(scorer),
            generator.clone(),
        );

        pipeline.ingest_document(Path::new("notes.txt")).unwrap();
        pipeline.generate_answer("alpha alpha alpha");

        // The second retrieved candidate scores 0.9 and must lead the
        // context regardless of its vector distance.
        let prompts = generator.prompts.lock().unwrap();
        let body = &prompts[0];
        let first = body.find("alpha alpha alpha document").unwrap();
        let second = body.find("beta beta beta document").unwrap();
        assert!(second < first);
    }

    #[test]
    fn document_with_no_survivors_ingests_as_noop() {
        let generator = Arc::new(RecordingGenerator::replying("ok"));
        let (_tmp, pipeline) = test_pipeline(vec![], None, generator);

        let report = pipeline
            .ingest_document(Path::new("empty.txt"))
            .unwrap();
        assert_eq!(report.chunks_stored, 0);
        assert!(pipeline.store().is_empty().unwrap());
    }

    #[test]
    fn unembeddable_chunks_are_skipped_without_error() {
        use crate::tokenize::LengthOracle;

        // Counts words but refuses to actually shorten anything, so the
        // chunker's truncation fallback cannot bring text under budget.
        struct StubbornOracle;
        impl LengthOracle for StubbornOracle {
            fn count_tokens(&self, text: &str) -> crate::error::Result<usize> {
                Ok(text.split_whitespace().count())
            }
            fn truncate(&self, text: &str, _max: usize) -> crate::error::Result<String> {
                Ok(text.to_string())
            }
            fn tail_tokens(&self, text: &str, _n: usize) -> crate::error::Result<String> {
                Ok(text.to_string())
            }
        }

        let long_sentence = (0..600)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");

        let tmp = tempfile::tempdir().unwrap();
        let store =
            Arc::new(VectorStore::open(&tmp.path().join("c.redb")).unwrap());
        let pipeline = Pipeline::assemble(
            Settings::default(),
            Arc::new(StubbornOracle),
            Arc::new(HashEncoder::default()),
            None,
            store,
            Arc::new(StubLoader {
                paragraphs: vec![long_sentence],
            }),
            Arc::new(RecordingGenerator::replying("ok")),
        )
        .unwrap();

        let report = pipeline
            .ingest_document(Path::new("huge.txt"))
            .unwrap();
        assert_eq!(report.chunks_stored, 0);
        assert_eq!(report.chunks_skipped, 1);
        assert!(pipeline.store().is_empty().unwrap());
    }

    #[test]
    fn chunk_ids_embed_source_and_index() {
        let generator = Arc::new(RecordingGenerator::replying("ok"));
        let (_tmp, pipeline) = test_pipeline(
            vec![
                "first paragraph of the document".to_string(),
                "second paragraph of the document".to_string(),
            ],
            None,
            generator,
        );

        pipeline.ingest_document(Path::new("dir/guide.md")).unwrap();

        let encoder = HashEncoder::default();
        let query = encoder
            .encode(&["first paragraph of the document".to_string()])
            .unwrap()
            .remove(0);
        let hits = pipeline.store().query(&query, 2).unwrap();

        let mut ids: Vec<&str> =
            hits.iter().map(|(c, _)| c.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["guide.md-0", "guide.md-1"]);
        assert!(hits.iter().all(|(c, _)| c.source == "guide.md"));
    }
}
