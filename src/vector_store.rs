//! Durable chunk + vector storage over redb.
//!
//! A collection is one redb file. Chunk metadata is stored as JSON and
//! vectors as raw little-endian f32 bytes keyed by chunk id. Queries are
//! a brute-force cosine-distance scan, which is plenty for the document
//! counts this pipeline targets.

use std::path::Path;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const VECTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const DIMENSION_KEY: &str = "dimension";

/// Hard ceiling on entries per insert transaction, mirroring the bulk
/// insertion limits of embedded vector indexes.
pub const MAX_INSERT_BATCH: usize = 5_000;

/// A bounded span of document text prepared for embedding.
///
/// Immutable once stored; removed only by [`VectorStore::clear`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique within a source document: `{source_basename}-{index}`.
    pub id: String,
    pub text: String,
    /// Basename of the originating document.
    pub source: String,
    /// Position of this chunk in the document's chunk sequence.
    pub sequence_index: usize,
}

/// A named, durable vector collection.
///
/// Re-opening the same path resumes the same logical collection.
/// Inserting an id that already exists overwrites the previous entry.
pub struct VectorStore {
    db: Database,
}

impl VectorStore {
    /// Open or create a collection at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_table(VECTORS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// The embedding dimension recorded on first insert, if any.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        Ok(table.get(DIMENSION_KEY)?.map(|v| v.value() as usize))
    }

    /// Number of stored chunks.
    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        Ok(table.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Bulk-insert chunk/vector pairs, sub-batched at [`MAX_INSERT_BATCH`]
    /// entries per transaction.
    ///
    /// All vectors in a collection must share one dimension; a mismatch
    /// against the recorded dimension is a configuration error.
    pub fn add_documents(&self, entries: &[(Chunk, Vec<f32>)]) -> Result<()> {
        let Some((_, first_vector)) = entries.first() else {
            return Ok(());
        };

        let dimension = first_vector.len();
        if dimension == 0 {
            return Err(Error::Config("refusing to store empty vectors".into()));
        }
        for (chunk, vector) in entries {
            if vector.len() != dimension {
                return Err(Error::Config(format!(
                    "vector dimension mismatch for chunk {}: {} != {}",
                    chunk.id,
                    vector.len(),
                    dimension
                )));
            }
        }
        if let Some(stored) = self.dimension()?
            && stored != dimension
        {
            return Err(Error::Config(format!(
                "collection dimension is {stored}, got vectors of {dimension}"
            )));
        }

        for window in entries.chunks(MAX_INSERT_BATCH) {
            let txn = self.db.begin_write()?;
            {
                let mut chunks = txn.open_table(CHUNKS)?;
                let mut vectors = txn.open_table(VECTORS)?;
                let mut meta = txn.open_table(META)?;

                meta.insert(DIMENSION_KEY, dimension as u64)?;

                for (chunk, vector) in window {
                    let encoded = serde_json::to_vec(chunk)?;
                    chunks.insert(chunk.id.as_str(), encoded.as_slice())?;
                    vectors.insert(
                        chunk.id.as_str(),
                        bytemuck::cast_slice::<f32, u8>(vector),
                    )?;
                }
            }
            txn.commit()?;
        }

        Ok(())
    }

    /// Nearest-neighbor scan: the `top_k` chunks closest to `query_vector`
    /// by cosine distance, ascending (best match first).
    pub fn query(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<(Chunk, f32)>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read()?;
        let vectors = txn.open_table(VECTORS)?;

        let mut scored: Vec<(String, f32)> = Vec::new();
        for entry in vectors.iter()? {
            let (key, value) = entry?;
            let bytes = value.value();
            if bytes.len() != query_vector.len() * 4 {
                continue;
            }
            let stored: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let distance = cosine_distance(query_vector, &stored);
            scored.push((key.value().to_string(), distance));
        }

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        let chunks = txn.open_table(CHUNKS)?;
        let mut results = Vec::with_capacity(scored.len());
        for (id, distance) in scored {
            let Some(value) = chunks.get(id.as_str())? else {
                continue;
            };
            let chunk: Chunk = serde_json::from_slice(value.value())?;
            results.push((chunk, distance));
        }

        Ok(results)
    }

    /// Drop every chunk and vector, keeping the collection open.
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut chunks = txn.open_table(CHUNKS)?;
            chunks.retain(|_, _| false)?;
            let mut vectors = txn.open_table(VECTORS)?;
            vectors.retain(|_, _| false)?;
            let mut meta = txn.open_table(META)?;
            meta.remove(DIMENSION_KEY)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore").finish_non_exhaustive()
    }
}

/// Cosine distance: 0 for identical directions, 1 for orthogonal,
/// 2 for opposite. Zero-norm vectors compare as maximally distant.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source: "doc.txt".to_string(),
            sequence_index: 0,
        }
    }

    fn test_store() -> (tempfile::TempDir, VectorStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(&tmp.path().join("test.redb")).unwrap();
        (tmp, store)
    }

    #[test]
    fn add_and_query_roundtrip() {
        let (_tmp, store) = test_store();
        store
            .add_documents(&[
                (chunk("doc.txt-0", "about rust"), vec![1.0, 0.0]),
                (chunk("doc.txt-1", "about pasta"), vec![0.0, 1.0]),
            ])
            .unwrap();

        let results = store.query(&[1.0, 0.1], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.text, "about rust");
        assert!(results[0].1 < results[1].1, "distances should ascend");
    }

    #[test]
    fn query_respects_top_k() {
        let (_tmp, store) = test_store();
        let entries: Vec<_> = (0..10)
            .map(|i| {
                (
                    chunk(&format!("doc.txt-{i}"), &format!("text {i}")),
                    vec![i as f32, 1.0],
                )
            })
            .collect();
        store.add_documents(&entries).unwrap();

        assert_eq!(store.query(&[1.0, 1.0], 3).unwrap().len(), 3);
        assert!(store.query(&[1.0, 1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_insert_is_a_noop() {
        let (_tmp, store) = test_store();
        store.add_documents(&[]).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn reopen_resumes_the_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("col.redb");

        {
            let store = VectorStore::open(&path).unwrap();
            store
                .add_documents(&[(chunk("a-0", "persisted"), vec![0.5, 0.5])])
                .unwrap();
        }

        let store = VectorStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.dimension().unwrap(), Some(2));
        let results = store.query(&[0.5, 0.5], 1).unwrap();
        assert_eq!(results[0].0.text, "persisted");
    }

    #[test]
    fn reinserting_an_id_overwrites() {
        let (_tmp, store) = test_store();
        store
            .add_documents(&[(chunk("a-0", "old"), vec![1.0, 0.0])])
            .unwrap();
        store
            .add_documents(&[(chunk("a-0", "new"), vec![1.0, 0.0])])
            .unwrap();

        assert_eq!(store.len().unwrap(), 1);
        let results = store.query(&[1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].0.text, "new");
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let (_tmp, store) = test_store();
        store
            .add_documents(&[(chunk("a-0", "x"), vec![1.0, 0.0])])
            .unwrap();

        let err = store
            .add_documents(&[(chunk("a-1", "y"), vec![1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn mixed_dimensions_within_one_call_are_rejected() {
        let (_tmp, store) = test_store();
        let err = store
            .add_documents(&[
                (chunk("a-0", "x"), vec![1.0, 0.0]),
                (chunk("a-1", "y"), vec![1.0]),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn inserts_above_the_batch_ceiling_are_split() {
        let (_tmp, store) = test_store();
        let entries: Vec<_> = (0..MAX_INSERT_BATCH + 10)
            .map(|i| (chunk(&format!("big-{i}"), "t"), vec![1.0f32]))
            .collect();

        store.add_documents(&entries).unwrap();
        assert_eq!(store.len().unwrap(), MAX_INSERT_BATCH + 10);
    }

    #[test]
    fn clear_empties_the_collection() {
        let (_tmp, store) = test_store();
        store
            .add_documents(&[(chunk("a-0", "x"), vec![1.0, 0.0])])
            .unwrap();
        store.clear().unwrap();

        assert!(store.is_empty().unwrap());
        assert_eq!(store.dimension().unwrap(), None);
        assert!(store.query(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn cosine_distance_behaviour() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
