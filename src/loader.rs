//! Document loading and paragraph extraction.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Reads a document from disk and yields its paragraphs.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<String>>;
}

/// Filesystem loader for plain-text and Markdown documents.
///
/// Paragraphs are blank-line-separated blocks; blocks at or under the
/// configured character minimum (headings, stray markup, page numbers)
/// are dropped before chunking.
pub struct FsLoader {
    min_paragraph_chars: usize,
}

impl FsLoader {
    pub fn new(min_paragraph_chars: usize) -> Self {
        Self { min_paragraph_chars }
    }
}

impl DocumentLoader for FsLoader {
    fn load(&self, path: &Path) -> Result<Vec<String>> {
        let supported = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt" | "md" | "markdown")
        );
        if !supported {
            return Err(Error::UnsupportedFile(path.to_path_buf()));
        }

        let text = std::fs::read_to_string(path)?;
        let paragraphs = split_paragraphs(&text, self.min_paragraph_chars);
        debug!(path = %path.display(), paragraphs = paragraphs.len(), "loaded document");
        Ok(paragraphs)
    }
}

/// Split raw text into paragraphs longer than `min_chars` characters.
///
/// Line endings are normalized first so CRLF documents split on blank
/// lines the same way Unix ones do.
pub fn split_paragraphs(text: &str, min_chars: usize) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| p.chars().count() > min_chars)
        .map(|p| p.to_string())
        .collect()
}
