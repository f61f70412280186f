use crate::error::{AppError, AppResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single question/answer entry in the authoritative corpus.
///
/// Identity is positional: a record is addressed by its zero-based index in
/// the corpus array as of the last reconciliation. Deleting a record shifts
/// every later index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl QaRecord {
    pub fn validate(&self) -> AppResult<()> {
        if self.question.trim().is_empty() {
            return Err(AppError::BadRequest("question must not be empty".into()));
        }
        if self.answer.trim().is_empty() {
            return Err(AppError::BadRequest("answer must not be empty".into()));
        }
        Ok(())
    }
}

/// File-backed store over the corpus JSON array.
///
/// Reads always go to disk so the reconciler and the search path observe
/// exactly what the CRUD surface last persisted. Mutations serialize on a
/// mutex and write atomically (tmp + rename).
pub struct CorpusStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw corpus bytes as stored, for the whole-file fingerprint.
    pub fn read_raw(&self) -> AppResult<Vec<u8>> {
        std::fs::read(&self.path)
            .map_err(|e| AppError::CorpusUnavailable(format!("{}: {}", self.path.display(), e)))
    }

    /// Load and parse the full corpus.
    pub fn read_all(&self) -> AppResult<Vec<QaRecord>> {
        let raw = self.read_raw()?;
        serde_json::from_slice(&raw)
            .map_err(|e| AppError::CorpusUnavailable(format!("{}: {}", self.path.display(), e)))
    }

    /// Position-indexed fetch.
    pub fn get(&self, index: usize) -> AppResult<QaRecord> {
        let records = self.read_all()?;
        records
            .into_iter()
            .nth(index)
            .ok_or(AppError::RecordNotFound(index))
    }

    pub fn count(&self) -> AppResult<usize> {
        Ok(self.read_all()?.len())
    }

    /// Append a record; returns its index. A missing corpus file is treated
    /// as an empty corpus so the first record can be created over the API.
    pub fn create(&self, record: QaRecord) -> AppResult<usize> {
        record.validate()?;
        let _guard = self.write_lock.lock();
        let mut records = match self.read_all() {
            Ok(r) => r,
            Err(AppError::CorpusUnavailable(_)) if !self.path.exists() => Vec::new(),
            Err(e) => return Err(e),
        };
        records.push(record);
        self.persist(&records)?;
        Ok(records.len() - 1)
    }

    /// Replace the record at `index` in place.
    pub fn update(&self, index: usize, record: QaRecord) -> AppResult<()> {
        record.validate()?;
        let _guard = self.write_lock.lock();
        let mut records = self.read_all()?;
        let slot = records
            .get_mut(index)
            .ok_or(AppError::RecordNotFound(index))?;
        *slot = record;
        self.persist(&records)?;
        Ok(())
    }

    /// Remove the record at `index`. Later records shift down by one, which
    /// the reconciler detects as changed content under the new positions.
    pub fn delete(&self, index: usize) -> AppResult<QaRecord> {
        let _guard = self.write_lock.lock();
        let mut records = self.read_all()?;
        if index >= records.len() {
            return Err(AppError::RecordNotFound(index));
        }
        let removed = records.remove(index);
        self.persist(&records)?;
        Ok(removed)
    }

    fn persist(&self, records: &[QaRecord]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records)?;
        // Atomic write: write to temp file then rename to prevent corruption on crash
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(q: &str, a: &str) -> QaRecord {
        QaRecord {
            question: q.to_string(),
            answer: a.to_string(),
            category: String::new(),
            audience: String::new(),
            keywords: vec![],
        }
    }

    #[test]
    fn crud_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(tmp.path().join("corpus.json"));

        let i0 = store.create(record("How do I reset my password?", "Use the reset link.")).unwrap();
        let i1 = store.create(record("What are the support hours?", "9 to 5 weekdays.")).unwrap();
        assert_eq!((i0, i1), (0, 1));
        assert_eq!(store.count().unwrap(), 2);

        store
            .update(1, record("What are the support hours?", "24/7."))
            .unwrap();
        assert_eq!(store.get(1).unwrap().answer, "24/7.");

        let removed = store.delete(0).unwrap();
        assert!(removed.question.contains("password"));
        // Positional shift: the remaining record is now index 0.
        assert_eq!(store.get(0).unwrap().answer, "24/7.");
        assert!(matches!(store.get(1), Err(AppError::RecordNotFound(1))));
    }

    #[test]
    fn missing_corpus_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(tmp.path().join("missing.json"));
        assert!(matches!(
            store.read_all(),
            Err(AppError::CorpusUnavailable(_))
        ));
    }

    #[test]
    fn unparsable_corpus_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("corpus.json");
        std::fs::write(&path, "not json").unwrap();
        let store = CorpusStore::new(path);
        assert!(matches!(
            store.read_all(),
            Err(AppError::CorpusUnavailable(_))
        ));
    }

    #[test]
    fn validation_rejects_empty_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CorpusStore::new(tmp.path().join("corpus.json"));
        assert!(store.create(record("", "an answer")).is_err());
        assert!(store.create(record("a question", "  ")).is_err());
    }
}
