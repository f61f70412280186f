//! Corpus ↔ vector-store reconciliation.
//!
//! A reconciliation pass diffs the current corpus fingerprints against the
//! persisted ledger, drops stale chunks, re-embeds only what changed, and
//! persists the cache artifact before the ledger. Crashing between the two
//! writes leaves the cache ahead of the ledger, which the next pass absorbs
//! by re-checking fingerprints; the reverse order could claim vectors that
//! were never written and is never done.

use crate::config::AppConfig;
use crate::corpus::{CorpusStore, QaRecord};
use crate::embedder::{chunk_text, searchable_text, EmbeddingClient};
use crate::error::{AppError, AppResult};
use crate::fingerprint::{
    corpus_fingerprint, load_corpus_digest, record_fingerprint, save_corpus_digest,
    FingerprintLedger,
};
use crate::vector_store::{Chunk, ScoredChunk, VectorStore};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub added: usize,
    pub changed: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub total_chunks: usize,
    pub duration_ms: u64,
}

/// Snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub initialized: bool,
    pub reconciling: bool,
    pub total_chunks: usize,
    pub ledger_entries: usize,
    pub dimensions: Option<usize>,
}

/// Owns the vector store and drives reconciliation against the corpus.
///
/// Single-writer, many-reader: queries take the store's read lock only for
/// the cosine pass, the reconciler takes short write locks around mutations
/// and never holds one across embedder I/O. Reconciliations themselves
/// serialize on `reconcile_lock`, so an overlapping request simply sees its
/// predecessor's ledger.
pub struct IndexManager {
    corpus: Arc<CorpusStore>,
    embedder: EmbeddingClient,
    store: RwLock<VectorStore>,
    /// Serializes reconciliation passes; also coalesces first-query
    /// initialization onto a single pass.
    reconcile_lock: Mutex<()>,
    /// Advisory in-progress flag for the status endpoint.
    is_reconciling: AtomicBool,
    initialized: AtomicBool,
    /// False until the persisted ledger is known to agree with the
    /// in-memory store (missing/corrupt/mismatched cache clears it, a
    /// successful pass sets it).
    ledger_trusted: AtomicBool,
    cache_path: PathBuf,
    ledger_path: PathBuf,
    corpus_digest_path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl IndexManager {
    /// Build the manager and pre-load the cache artifact.
    ///
    /// A missing cache is normal (full rebuild on first pass). A corrupt
    /// cache or a dimensionality disagreement with the embedder drops the
    /// cache with a warning and forces a full rebuild; the persisted ledger
    /// is distrusted in both cases because it would claim chunks the store
    /// no longer holds.
    pub fn new(config: &AppConfig, corpus: Arc<CorpusStore>, embedder: EmbeddingClient) -> Self {
        let cache_path = config.cache_path();
        let mut store = VectorStore::new();

        let mut cache_loaded = match store.load_from_file(&cache_path) {
            Ok(found) => {
                if found {
                    info!(chunks = store.count(), "Loaded vector cache");
                }
                found
            }
            Err(e) => {
                warn!("Vector cache unreadable, rebuilding from scratch: {e}");
                store.clear();
                false
            }
        };

        if let Err(e) = store.init(embedder.dimensions()) {
            warn!("Dropping vector cache: {e}");
            store.clear();
            cache_loaded = false;
            // Re-init on the cleared store always succeeds.
            let _ = store.init(embedder.dimensions());
        }

        Self {
            corpus,
            embedder,
            store: RwLock::new(store),
            reconcile_lock: Mutex::new(()),
            is_reconciling: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            ledger_trusted: AtomicBool::new(cache_loaded),
            cache_path,
            ledger_path: config.record_fingerprints_path(),
            corpus_digest_path: config.corpus_fingerprint_path(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    /// Run the first reconciliation if it has not happened yet. Concurrent
    /// callers coalesce: the first one reconciles, the rest wait on the
    /// same mutex and observe `initialized`.
    pub async fn ensure_initialized(&self) -> AppResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let guard = self.reconcile_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.reconcile_inner(&guard).await?;
        Ok(())
    }

    /// Force a reconciliation pass (called after corpus mutations).
    pub async fn refresh(&self) -> AppResult<ReconcileSummary> {
        let guard = self.reconcile_lock.lock().await;
        self.reconcile_inner(&guard).await
    }

    pub fn status(&self) -> IndexStatus {
        let ledger = FingerprintLedger::load(&self.ledger_path);
        let store = self.store.read();
        IndexStatus {
            initialized: self.initialized.load(Ordering::Acquire),
            reconciling: self.is_reconciling.load(Ordering::Acquire),
            total_chunks: store.count(),
            ledger_entries: ledger.entries.len(),
            dimensions: store.dimensions(),
        }
    }

    /// Cosine search over the store. Callers embed the query *before*
    /// calling so no provider I/O happens under the read lock.
    pub fn search_chunks(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        self.store.read().search(query, k)
    }

    async fn reconcile_inner(&self, _serialized: &tokio::sync::MutexGuard<'_, ()>) -> AppResult<ReconcileSummary> {
        self.is_reconciling.store(true, Ordering::Release);
        let result = self.reconcile_pass().await;
        self.is_reconciling.store(false, Ordering::Release);
        result
    }

    async fn reconcile_pass(&self) -> AppResult<ReconcileSummary> {
        let start = std::time::Instant::now();

        // Load and fingerprint the corpus from one consistent byte snapshot.
        let raw = self.corpus.read_raw()?;
        let records: Vec<QaRecord> = serde_json::from_slice(&raw).map_err(|e| {
            AppError::CorpusUnavailable(format!("{}: {}", self.corpus.path().display(), e))
        })?;
        let current_digest = corpus_fingerprint(&raw);
        let curr: BTreeMap<usize, String> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, record_fingerprint(r)))
            .collect();

        let ledger_trusted = self.ledger_trusted.load(Ordering::Acquire);
        let prev = if ledger_trusted {
            FingerprintLedger::load(&self.ledger_path).entries
        } else {
            BTreeMap::new()
        };

        // Whole-file fast path: identical bytes and full ledger coverage
        // means nothing to embed and nothing to retry.
        if ledger_trusted
            && load_corpus_digest(&self.corpus_digest_path).as_deref() == Some(current_digest.as_str())
            && curr.keys().all(|i| prev.contains_key(i))
        {
            let total_chunks = self.store.read().count();
            self.initialized.store(true, Ordering::Release);
            info!(records = curr.len(), total_chunks, "Corpus unchanged, reconciliation is a no-op");
            return Ok(ReconcileSummary {
                added: 0,
                changed: 0,
                deleted: 0,
                unchanged: curr.len(),
                failed: 0,
                total_chunks,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        // Classify every index against the previous ledger.
        let deleted: Vec<usize> = prev
            .keys()
            .filter(|i| !curr.contains_key(*i))
            .copied()
            .collect();
        let mut added: BTreeSet<usize> = BTreeSet::new();
        let mut changed: BTreeSet<usize> = BTreeSet::new();
        let mut unchanged = 0usize;
        for (i, digest) in &curr {
            match prev.get(i) {
                None => {
                    added.insert(*i);
                }
                Some(old) if old != digest => {
                    changed.insert(*i);
                }
                Some(_) => unchanged += 1,
            }
        }

        // Ascending union of added and changed; both get their stale chunks
        // dropped up front so a replacement can never coexist with what it
        // replaces (and a cache-ahead crash cannot duplicate an insert).
        let work: Vec<usize> = added.union(&changed).copied().collect();

        {
            let mut store = self.store.write();
            for i in &deleted {
                store.delete_by_payload_index(*i);
            }
            for i in &work {
                store.delete_by_payload_index(*i);
            }
        }

        info!(
            added = added.len(),
            changed = changed.len(),
            deleted = deleted.len(),
            unchanged,
            "Reconciling corpus"
        );

        // Embed outside any lock, one record at a time in ascending index
        // order. A record is inserted only when every one of its chunks
        // embedded; partial failure leaves it out of the ledger so the next
        // pass retries it.
        let mut failed: BTreeSet<usize> = BTreeSet::new();
        for &i in &work {
            let text = searchable_text(&records[i]);
            let pieces = chunk_text(&text, self.chunk_size, self.chunk_overlap);

            let mut new_chunks: Vec<Chunk> = Vec::with_capacity(pieces.len());
            let mut record_ok = !pieces.is_empty();
            for piece in pieces {
                match self.embedder.embed(&piece).await {
                    Ok(vector) => new_chunks.push(Chunk {
                        payload_index: i,
                        text: piece,
                        vector,
                    }),
                    Err(e) => {
                        warn!(index = i, "Embedding failed, record left for next pass: {e}");
                        record_ok = false;
                        break;
                    }
                }
            }

            if record_ok {
                self.store.write().insert(new_chunks)?;
            } else {
                failed.insert(i);
            }
        }

        // Persist: cache artifact first, then the ledger restricted to
        // indices that actually embedded.
        {
            let store = self.store.read();
            store.save_to_file(&self.cache_path)?;
        }

        let mut ledger = FingerprintLedger::default();
        for (i, digest) in &curr {
            if !failed.contains(i) {
                ledger.entries.insert(*i, digest.clone());
            }
        }
        ledger.save(&self.ledger_path)?;
        save_corpus_digest(&self.corpus_digest_path, &current_digest)?;

        self.ledger_trusted.store(true, Ordering::Release);
        self.initialized.store(true, Ordering::Release);

        let summary = ReconcileSummary {
            added: added.iter().filter(|i| !failed.contains(*i)).count(),
            changed: changed.iter().filter(|i| !failed.contains(*i)).count(),
            deleted: deleted.len(),
            unchanged,
            failed: failed.len(),
            total_chunks: self.store.read().count(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            added = summary.added,
            changed = summary.changed,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            failed = summary.failed,
            total_chunks = summary.total_chunks,
            duration_ms = summary.duration_ms,
            "Reconciliation complete"
        );

        Ok(summary)
    }
}
