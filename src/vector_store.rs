use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A text fragment plus its embedding vector, tied back to a corpus record
/// by positional `payload_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub payload_index: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A chunk tagged with its cosine similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub payload_index: usize,
    pub text: String,
    pub score: f32,
}

/// On-disk form of the vector store: self-describing, single file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheArtifact {
    dimensions: usize,
    vectors: Vec<Chunk>,
    saved_at: DateTime<Utc>,
}

/// In-memory collection of chunks with exact cosine search.
///
/// The store exclusively owns its chunks. Search is a brute-force O(N·D)
/// scan; the corpus is small (tens to low thousands of records) and
/// correctness after mutation outranks throughput.
#[derive(Debug, Default)]
pub struct VectorStore {
    dimensions: Option<usize>,
    chunks: Vec<Chunk>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the embedding dimensionality. Chunks loaded from the cache
    /// beforehand are preserved; load-before-init is a supported sequence.
    /// A disagreement with already-loaded vectors is surfaced so the caller
    /// can drop the cache and rebuild.
    pub fn init(&mut self, dimensions: usize) -> AppResult<()> {
        if let Some(cached) = self.dimensions {
            if cached != dimensions {
                return Err(AppError::DimensionMismatch {
                    cached,
                    declared: dimensions,
                });
            }
        }
        self.dimensions = Some(dimensions);
        Ok(())
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Drop all chunks and the dimensionality declaration.
    pub fn clear(&mut self) {
        self.dimensions = None;
        self.chunks.clear();
    }

    /// Replace in-memory state from the cache artifact.
    ///
    /// Returns whether a cache was found: a missing file is a normal
    /// outcome, not an error. Any other failure is corruption and is
    /// surfaced.
    pub fn load_from_file(&mut self, path: &Path) -> AppResult<bool> {
        let json = match std::fs::read_to_string(path) {
            Ok(j) => j,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(AppError::CacheCorrupt(format!("{}: {}", path.display(), e))),
        };
        let artifact: CacheArtifact = serde_json::from_str(&json)
            .map_err(|e| AppError::CacheCorrupt(format!("{}: {}", path.display(), e)))?;

        if let Some(bad) = artifact
            .vectors
            .iter()
            .find(|c| c.vector.len() != artifact.dimensions)
        {
            return Err(AppError::CacheCorrupt(format!(
                "{}: vector for payload {} has {} dimensions, artifact declares {}",
                path.display(),
                bad.payload_index,
                bad.vector.len(),
                artifact.dimensions
            )));
        }

        self.dimensions = Some(artifact.dimensions);
        self.chunks = artifact.vectors;
        Ok(true)
    }

    /// Serialize the full in-memory state to the cache artifact.
    pub fn save_to_file(&self, path: &Path) -> AppResult<()> {
        let artifact = CacheArtifact {
            dimensions: self.dimensions.unwrap_or(0),
            vectors: self.chunks.clone(),
            saved_at: Utc::now(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&artifact)?;
        // Atomic write: tmp file then rename
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Append chunks; returns the count inserted. Every vector must match
    /// the declared dimensionality.
    pub fn insert(&mut self, chunks: Vec<Chunk>) -> AppResult<usize> {
        let declared = self
            .dimensions
            .ok_or_else(|| AppError::BadRequest("vector store not initialized".into()))?;
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != declared) {
            return Err(AppError::DimensionMismatch {
                cached: bad.vector.len(),
                declared,
            });
        }
        let inserted = chunks.len();
        self.chunks.extend(chunks);
        Ok(inserted)
    }

    /// Remove every chunk tied to `payload_index`; returns the count removed.
    pub fn delete_by_payload_index(&mut self, payload_index: usize) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|c| c.payload_index != payload_index);
        before - self.chunks.len()
    }

    pub fn count(&self) -> usize {
        self.chunks.len()
    }

    pub fn count_by_payload_index(&self, payload_index: usize) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.payload_index == payload_index)
            .count()
    }

    /// Exact top-k cosine search, descending score. Ties break by insertion
    /// order (the stable sort keeps earlier chunks first).
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|c| ScoredChunk {
                payload_index: c.payload_index,
                text: c.text.clone(),
                score: cosine_similarity(query, &c.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// `(a · b) / (|a| · |b|)`; zero when either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(payload_index: usize, vector: Vec<f32>) -> Chunk {
        Chunk {
            payload_index,
            text: format!("chunk for record {payload_index}"),
            vector,
        }
    }

    #[test]
    fn insert_enforces_dimensionality() {
        let mut store = VectorStore::new();
        store.init(3).unwrap();
        assert_eq!(store.insert(vec![chunk(0, vec![1.0, 0.0, 0.0])]).unwrap(), 1);
        assert!(matches!(
            store.insert(vec![chunk(1, vec![1.0, 0.0])]),
            Err(AppError::DimensionMismatch { .. })
        ));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn delete_by_payload_removes_all_chunks_of_a_record() {
        let mut store = VectorStore::new();
        store.init(2).unwrap();
        store
            .insert(vec![
                chunk(0, vec![1.0, 0.0]),
                chunk(1, vec![0.0, 1.0]),
                chunk(1, vec![0.5, 0.5]),
            ])
            .unwrap();
        assert_eq!(store.count_by_payload_index(1), 2);
        assert_eq!(store.delete_by_payload_index(1), 2);
        assert_eq!(store.count_by_payload_index(1), 0);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn search_orders_by_score_and_truncates() {
        let mut store = VectorStore::new();
        store.init(2).unwrap();
        store
            .insert(vec![
                chunk(0, vec![1.0, 0.0]),
                chunk(1, vec![0.0, 1.0]),
                chunk(2, vec![1.0, 1.0]),
            ])
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload_index, 0);
        assert_eq!(hits[1].payload_index, 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_ties_break_by_insertion_order() {
        let mut store = VectorStore::new();
        store.init(2).unwrap();
        // Identical vectors: identical scores against any query.
        store
            .insert(vec![
                chunk(7, vec![1.0, 0.0]),
                chunk(3, vec![1.0, 0.0]),
            ])
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].payload_index, 7);
        assert_eq!(hits[1].payload_index, 3);
    }

    #[test]
    fn zero_norm_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vector_cache.json");

        let mut store = VectorStore::new();
        store.init(2).unwrap();
        store
            .insert(vec![chunk(0, vec![1.0, 0.0]), chunk(1, vec![0.0, 1.0])])
            .unwrap();
        store.save_to_file(&path).unwrap();

        let mut loaded = VectorStore::new();
        assert!(loaded.load_from_file(&path).unwrap());
        assert_eq!(loaded.dimensions(), Some(2));
        assert_eq!(loaded.count(), 2);
        assert_eq!(loaded.count_by_payload_index(0), 1);
        assert_eq!(loaded.count_by_payload_index(1), 1);
    }

    #[test]
    fn load_before_init_preserves_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vector_cache.json");

        let mut store = VectorStore::new();
        store.init(2).unwrap();
        store.insert(vec![chunk(0, vec![1.0, 0.0])]).unwrap();
        store.save_to_file(&path).unwrap();

        let mut loaded = VectorStore::new();
        loaded.load_from_file(&path).unwrap();
        loaded.init(2).unwrap();
        assert_eq!(loaded.count(), 1);
    }

    #[test]
    fn init_detects_dimension_mismatch_with_loaded_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vector_cache.json");

        let mut store = VectorStore::new();
        store.init(2).unwrap();
        store.insert(vec![chunk(0, vec![1.0, 0.0])]).unwrap();
        store.save_to_file(&path).unwrap();

        let mut loaded = VectorStore::new();
        loaded.load_from_file(&path).unwrap();
        assert!(matches!(
            loaded.init(3),
            Err(AppError::DimensionMismatch { cached: 2, declared: 3 })
        ));
    }

    #[test]
    fn missing_cache_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = VectorStore::new();
        assert!(!store.load_from_file(&tmp.path().join("absent.json")).unwrap());
    }

    #[test]
    fn corrupt_cache_is_surfaced() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vector_cache.json");
        std::fs::write(&path, "").unwrap();
        let mut store = VectorStore::new();
        assert!(matches!(
            store.load_from_file(&path),
            Err(AppError::CacheCorrupt(_))
        ));
    }
}
