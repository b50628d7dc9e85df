//! Local retrieval-augmented question answering over plain-text and
//! Markdown documents.
//!
//! Documents are split into token-bounded, overlapping chunks, embedded
//! with a local ONNX model and stored in an embedded redb collection.
//! Questions retrieve the nearest chunks, optionally rerank them with a
//! cross-encoder, and hand the assembled prompt to a local Ollama model.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use ragpipe::{config::Settings, data_dir::DataDir, pipeline::Pipeline};
//!
//! # fn main() -> ragpipe::error::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let pipeline = Pipeline::open(Settings::from_env(), &data_dir)?;
//!
//! pipeline.ingest_document(Path::new("notes.md"))?;
//! let answer = pipeline.generate_answer("What did I write about redb?");
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod embedder;
pub mod error;
pub mod generation;
pub mod loader;
pub mod model_manager;
pub mod pipeline;
pub mod prompt;
pub mod reranker;
pub mod retriever;
pub mod tokenize;
pub mod vector_store;

#[cfg(test)]
mod test_util;
