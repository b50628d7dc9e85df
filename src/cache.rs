//! In-memory LRU cache for generated answers.
//!
//! Keys are normalized question text (lowercased, whitespace collapsed)
//! so trivially re-phrased repeats of a question hit the cache. Only
//! successful answers are stored; the fixed failure reply never is.

use std::collections::HashMap;

use tracing::debug;

struct CachedAnswer {
    answer: String,
    last_used: u64,
}

/// Bounded answer cache with least-recently-used eviction.
///
/// A capacity of zero disables the cache entirely.
pub struct AnswerCache {
    entries: HashMap<String, CachedAnswer>,
    capacity: usize,
    clock: u64,
}

impl AnswerCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the cached answer for `question`, refreshing its recency.
    pub fn get(&mut self, question: &str) -> Option<String> {
        let key = normalize(question);
        self.clock += 1;
        let clock = self.clock;

        let entry = self.entries.get_mut(&key)?;
        entry.last_used = clock;
        debug!("answer cache hit");
        Some(entry.answer.clone())
    }

    /// Store an answer, evicting the least-recently-used entry when full.
    pub fn put(&mut self, question: &str, answer: String) {
        if self.capacity == 0 {
            return;
        }

        let key = normalize(question);
        self.clock += 1;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }

        self.entries.insert(
            key,
            CachedAnswer {
                answer,
                last_used: self.clock,
            },
        );
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

fn normalize(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
