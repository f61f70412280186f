use crate::corpus::QaRecord;
use crate::error::AppResult;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 128-bit MD5 digest rendered as lowercase hex. Change detection only, no
/// security claim.
fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Digest of a record's canonical form.
///
/// Field order is fixed (question, answer, category, audience, keywords);
/// keywords are sorted before joining so the digest is insensitive to their
/// ordering but sensitive to any edit of the semantic fields.
pub fn record_fingerprint(record: &QaRecord) -> String {
    let mut keywords = record.keywords.clone();
    keywords.sort();
    let canonical = format!(
        "{}|{}|{}|{}|{}",
        record.question,
        record.answer,
        record.category,
        record.audience,
        keywords.join(",")
    );
    md5_hex(canonical.as_bytes())
}

/// Digest of the raw corpus file bytes as stored. Coarse short-circuit for
/// the reconciler: equal digests mean no record can have changed.
pub fn corpus_fingerprint(raw: &[u8]) -> String {
    md5_hex(raw)
}

/// Persisted map of positional index to record fingerprint, paired with the
/// whole-corpus digest from the same reconciliation.
///
/// A `BTreeMap` keeps the serialized form key-sorted, so rewriting an
/// unchanged ledger is byte-identical.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintLedger {
    pub entries: BTreeMap<usize, String>,
}

impl FingerprintLedger {
    /// Load the ledger sidecar. Absence is a normal outcome (empty ledger);
    /// an unreadable sidecar is also treated as empty, forcing a rebuild.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        // Atomic write: tmp file then rename
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Load the persisted whole-corpus digest, if any.
pub fn load_corpus_digest(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn save_corpus_digest(path: &Path, digest: &str) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("txt.tmp");
    std::fs::write(&tmp, digest)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
