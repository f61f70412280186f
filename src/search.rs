use crate::corpus::CorpusStore;
use crate::error::AppResult;
use crate::indexer::IndexManager;
use crate::vector_store::ScoredChunk;
use serde::{Deserialize, Serialize};

/// Over-fetch multiplier: a record chunked into several pieces can occupy
/// several of the raw top-K slots, so we pull extra before de-duplicating.
const OVERFETCH_FACTOR: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub question: String,
    pub answer: String,
    pub category: String,
    pub audience: String,
    pub keywords: Vec<String>,
    pub similarity: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub query_time_ms: u64,
}

/// Clamp a requested result count to `[1, max_k]`.
pub fn clamp_k(requested: usize, max_k: usize) -> usize {
    requested.clamp(1, max_k.max(1))
}

/// Keep only the best-scoring chunk per payload index. Input is already in
/// descending score order, so the first occurrence wins.
pub fn dedup_by_payload(hits: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.payload_index))
        .collect()
}

/// Run a similarity query end to end.
///
/// The query is embedded before the store's read lock is taken, so provider
/// latency never blocks reconciliation or other readers. A query that embeds
/// to a zero vector returns an empty list rather than an error.
pub async fn search(
    index: &IndexManager,
    corpus: &CorpusStore,
    query: &str,
    k: usize,
) -> AppResult<SearchResponse> {
    let start = std::time::Instant::now();

    index.ensure_initialized().await?;

    let query_vector = index.embedder().embed(query).await?;
    if query_vector.iter().all(|v| *v == 0.0) {
        return Ok(SearchResponse {
            hits: vec![],
            query_time_ms: start.elapsed().as_millis() as u64,
        });
    }

    let raw_hits = index.search_chunks(&query_vector, k * OVERFETCH_FACTOR);
    let deduped = dedup_by_payload(raw_hits);

    // Resolve surviving payload indices against the current corpus. An
    // index that no longer resolves is a stale chunk (reconciliation
    // pending or failed) and is skipped silently.
    let records = corpus.read_all()?;
    let mut hits = Vec::with_capacity(k.min(deduped.len()));
    for scored in deduped {
        if hits.len() == k {
            break;
        }
        let Some(record) = records.get(scored.payload_index) else {
            continue;
        };
        hits.push(SearchHit {
            question: record.question.clone(),
            answer: record.answer.clone(),
            category: record.category.clone(),
            audience: record.audience.clone(),
            keywords: record.keywords.clone(),
            similarity: scored.score,
            rank: hits.len() + 1,
        });
    }

    Ok(SearchResponse {
        hits,
        query_time_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(payload_index: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            payload_index,
            text: String::new(),
            score,
        }
    }

    #[test]
    fn dedup_keeps_highest_scoring_chunk_per_record() {
        let hits = vec![scored(1, 0.9), scored(0, 0.8), scored(1, 0.7), scored(2, 0.6)];
        let deduped = dedup_by_payload(hits);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].payload_index, 1);
        assert!((deduped[0].score - 0.9).abs() < f32::EPSILON);
        assert_eq!(deduped[1].payload_index, 0);
        assert_eq!(deduped[2].payload_index, 2);
    }

    #[test]
    fn clamp_k_bounds() {
        assert_eq!(clamp_k(0, 50), 1);
        assert_eq!(clamp_k(10, 50), 10);
        assert_eq!(clamp_k(500, 50), 50);
    }
}
