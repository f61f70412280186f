//! Embedding provider client and searchable-text preparation.
//!
//! The provider speaks the OpenAI-compatible `/v1/embeddings` shape:
//! request `{model, input}`, response `{data: [{embedding: [..]}]}`,
//! bearer-token auth. Retries are deliberately not done here; the
//! reconciler owns that policy.

use crate::corpus::QaRecord;
use crate::error::{AppError, AppResult};
use std::time::Duration;

/// HTTP client for the embeddings endpoint.
///
/// Instantiate once and share across reconciliation and query embedding.
pub struct EmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimensions,
        }
    }

    /// Declared dimensionality of every vector this client returns.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one text. Fails with `EmbedTransport` on network/HTTP-level
    /// trouble (including the deadline) and `EmbedRejected` when the
    /// provider refuses or answers nonsense.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::EmbedTransport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            // Auth, quota, and validation refusals are rejections; everything
            // else on the wire is transport.
            return if matches!(status.as_u16(), 400 | 401 | 403 | 422 | 429) {
                Err(AppError::EmbedRejected(format!("{status}: {detail}")))
            } else {
                Err(AppError::EmbedTransport(format!("{status}: {detail}")))
            };
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::EmbedRejected(format!("unreadable response body: {e}")))?;
        let vector = parse_embedding_response(&json)?;

        if vector.len() != self.dimensions {
            return Err(AppError::EmbedRejected(format!(
                "provider returned a {}-dimensional vector, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(vector)
    }
}

fn parse_embedding_response(json: &serde_json::Value) -> AppResult<Vec<f32>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| AppError::EmbedRejected("response missing 'data' array".into()))?;

    let raw = data
        .first()
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| AppError::EmbedRejected("response missing 'embedding' array".into()))?;

    #[allow(clippy::cast_possible_truncation)]
    Ok(raw
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect())
}

// ---------------------------------------------------------------------------
// Searchable text & chunking
// ---------------------------------------------------------------------------

/// Text handed to the embedder for a record: question, keywords, category
/// and audience joined by spaces, empty fields omitted. The answer is left
/// out; retrieval matches against what users ask, not what we reply.
pub fn searchable_text(record: &QaRecord) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(4 + record.keywords.len());
    parts.push(record.question.as_str());
    for kw in &record.keywords {
        if !kw.is_empty() {
            parts.push(kw.as_str());
        }
    }
    if !record.category.is_empty() {
        parts.push(record.category.as_str());
    }
    if !record.audience.is_empty() {
        parts.push(record.audience.as_str());
    }
    parts.join(" ")
}

/// Split text into overlapping character windows for embedding.
///
/// Text at or under `max_chars` yields exactly one chunk. Offsets move in
/// `max_chars - overlap` steps, so consecutive chunks share `overlap`
/// characters of context.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let step = max_chars.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> QaRecord {
        QaRecord {
            question: "How do I export my data?".into(),
            answer: "From the settings page, choose Export.".into(),
            category: "account".into(),
            audience: "customers".into(),
            keywords: vec!["export".into(), "backup".into()],
        }
    }

    #[test]
    fn searchable_text_joins_fields() {
        assert_eq!(
            searchable_text(&record()),
            "How do I export my data? export backup account customers"
        );
    }

    #[test]
    fn searchable_text_omits_empty_fields() {
        let mut r = record();
        r.category.clear();
        r.audience.clear();
        r.keywords.clear();
        assert_eq!(searchable_text(&r), "How do I export my data?");
    }

    #[test]
    fn small_text_is_one_chunk() {
        let chunks = chunk_text("short question", 1000, 100);
        assert_eq!(chunks, vec!["short question".to_string()]);
    }

    #[test]
    fn long_text_chunks_overlap() {
        let text = "a".repeat(250);
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        // Consecutive chunks share `overlap` characters.
        let first: Vec<char> = chunks[0].chars().collect();
        let second: Vec<char> = chunks[1].chars().collect();
        assert_eq!(&first[first.len() - 20..], &second[..20]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000, 100).is_empty());
    }

    #[test]
    fn parse_embedding_response_valid() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3]}]
        });
        let v = parse_embedding_response(&json).unwrap();
        assert_eq!(v.len(), 3);
        assert!((v[0] - 0.1f32).abs() < 1e-5);
    }

    #[test]
    fn parse_embedding_response_missing_data() {
        let json = serde_json::json!({"model": "test"});
        assert!(matches!(
            parse_embedding_response(&json),
            Err(AppError::EmbedRejected(_))
        ));
    }

    #[test]
    fn parse_embedding_response_missing_embedding_field() {
        let json = serde_json::json!({"data": [{"index": 0}]});
        assert!(matches!(
            parse_embedding_response(&json),
            Err(AppError::EmbedRejected(_))
        ));
    }
}
