//! Rug Database
//!
//! Append-only store of known-rug bytecode hashes and fingerprints, persisted as
//! a single JSON document. Writes go through a temp file in the target
//! directory followed by a rename, so readers never see a torn file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::core::bytecode::fingerprint_hash;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::BytecodeFingerprint;

/// On-disk and in-memory rug database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RugDatabase {
    /// Content hashes of normalized rug bytecode
    #[serde(default)]
    hashes: BTreeSet<String>,
    /// Fingerprints of rug bytecode
    #[serde(default)]
    fingerprints: Vec<BytecodeFingerprint>,
    /// Dedup index over `fingerprints`; rebuilt on load
    #[serde(rename = "_fpHashes", default)]
    fp_hashes: BTreeSet<String>,
    /// Backing file; None for a purely in-memory database
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl RugDatabase {
    /// Database with no backing file
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) the database at `path`
    ///
    /// Never fails: a missing file yields an empty database, a corrupt one is
    /// moved aside to `<file>.corrupt` and replaced by an empty database.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let mut db = match Self::read_file(&path) {
            Ok(Some(db)) => {
                info!(
                    "📚 Rug DB loaded: {} hashes, {} fingerprints ({})",
                    db.hashes.len(),
                    db.fingerprints.len(),
                    path.display()
                );
                db
            }
            Ok(None) => {
                info!("📚 Rug DB not found, starting empty ({})", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("⚠️ Rug DB unreadable ({}): {}", path.display(), e);
                Self::quarantine(&path);
                Self::default()
            }
        };

        let fresh = db.is_empty() && !path.exists();
        db.path = Some(path);

        if fresh {
            if let Err(e) = db.save() {
                warn!("⚠️ Failed to create rug DB file: {}", e);
            }
        }
        db
    }

    /// Read and parse a database file. Ok(None) when the file does not exist.
    fn read_file(path: &Path) -> AppResult<Option<Self>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorCode::DbReadFailed,
                    format!("Failed to read {}", path.display()),
                    e,
                ))
            }
        };

        let mut db: Self = serde_json::from_str(&raw)?;
        db.rebuild_index();
        Ok(Some(db))
    }

    /// Move a bad file out of the way so the next save starts clean
    fn quarantine(path: &Path) {
        let mut aside = path.as_os_str().to_owned();
        aside.push(".corrupt");
        let aside = PathBuf::from(aside);
        match fs::rename(path, &aside) {
            Ok(()) => warn!("🗄️ Corrupt rug DB moved to {}", aside.display()),
            Err(e) => warn!("⚠️ Could not move corrupt rug DB aside: {}", e),
        }
    }

    /// Lowercase hashes, recompute the fingerprint dedup index and drop duplicates
    fn rebuild_index(&mut self) {
        self.hashes = std::mem::take(&mut self.hashes)
            .into_iter()
            .map(|h| h.to_lowercase())
            .collect();

        let mut seen = BTreeSet::new();
        self.fingerprints.retain(|fp| seen.insert(fingerprint_hash(fp)));
        self.fp_hashes = seen;
    }

    /// No hashes and no fingerprints
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty() && self.fingerprints.is_empty()
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes.contains(&hash.to_lowercase())
    }

    pub fn fingerprints(&self) -> &[BytecodeFingerprint] {
        &self.fingerprints
    }

    pub fn hash_count(&self) -> usize {
        self.hashes.len()
    }

    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns true if the hash was new
    pub fn add_hash(&mut self, hash: &str) -> bool {
        self.hashes.insert(hash.to_lowercase())
    }

    /// Returns true if the fingerprint was new
    pub fn add_fingerprint(&mut self, fp: BytecodeFingerprint) -> bool {
        if !self.fp_hashes.insert(fingerprint_hash(&fp)) {
            return false;
        }
        self.fingerprints.push(fp);
        true
    }

    /// Set union of hashes, dedup-append of fingerprints
    pub fn merge(&mut self, other: Self) {
        self.hashes
            .extend(other.hashes.into_iter().map(|h| h.to_lowercase()));
        for fp in other.fingerprints {
            self.add_fingerprint(fp);
        }
    }

    /// Fold in whatever other writers appended since this copy was loaded
    pub fn merge_from_disk(&mut self) -> AppResult<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        match Self::read_file(&path) {
            Ok(Some(disk)) => {
                self.merge(disk);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                // a corrupt disk copy is replaced by ours on the next save
                warn!("⚠️ Skipping merge of unreadable rug DB: {}", e);
                Ok(())
            }
        }
    }

    /// Write atomically: temp file in the target directory, then rename
    pub fn save(&self) -> AppResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::with_source(
                ErrorCode::DbWriteFailed,
                format!("Failed to create {}", dir.display()),
                e,
            )
        })?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| {
            AppError::with_source(ErrorCode::DbWriteFailed, "Failed to create temp file", e)
        })?;
        serde_json::to_writer_pretty(&mut tmp, self)
            .map_err(|e| AppError::db_write(format!("Failed to serialize rug DB: {}", e)))?;
        tmp.write_all(b"\n")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| AppError::with_source(ErrorCode::DbWriteFailed, "Failed to flush rug DB", e))?;
        tmp.persist(path).map_err(|e| {
            AppError::with_source(
                ErrorCode::DbWriteFailed,
                format!("Failed to persist {}", path.display()),
                e.error,
            )
        })?;

        debug!(
            "💾 Rug DB saved: {} hashes, {} fingerprints",
            self.hashes.len(),
            self.fingerprints.len()
        );
        Ok(())
    }

    /// Record a confirmed rug and persist it
    ///
    /// Returns true when anything new was written.
    pub fn persist_detection(
        &mut self,
        hash: &str,
        fingerprint: BytecodeFingerprint,
    ) -> AppResult<bool> {
        self.merge_from_disk()?;
        let new_hash = self.add_hash(hash);
        let new_fp = self.add_fingerprint(fingerprint);
        if !(new_hash || new_fp) {
            return Ok(false);
        }
        self.save()?;
        info!("🧬 Rug DB reinforced with {}", hash);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bytecode::fingerprint;
    use tempfile::tempdir;

    fn sample_fp(code: &[u8]) -> BytecodeFingerprint {
        fingerprint(code)
    }

    #[test]
    fn test_open_missing_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rug_db.json");
        let db = RugDatabase::open(&path);
        assert!(db.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rug_db.json");

        let mut db = RugDatabase::open(&path);
        db.add_hash("0xABCDEF");
        db.add_fingerprint(sample_fp(&[0x60, 0x01, 0xf4]));
        db.save().unwrap();

        let reloaded = RugDatabase::open(&path);
        assert!(reloaded.contains_hash("0xabcdef"));
        assert_eq!(reloaded.fingerprint_count(), 1);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"hashes\""));
        assert!(raw.contains("\"fingerprints\""));
        assert!(raw.contains("\"_fpHashes\""));
        assert!(raw.contains("\"opHist\""));
    }

    #[test]
    fn test_corrupt_file_is_quarantined() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rug_db.json");
        fs::write(&path, "{ not json").unwrap();

        let db = RugDatabase::open(&path);
        assert!(db.is_empty());
        assert!(dir.path().join("rug_db.json.corrupt").exists());

        // recreated as a valid empty database
        let raw = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed["hashes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_fingerprint_dedup() {
        let mut db = RugDatabase::in_memory();
        let fp = sample_fp(&[0x60, 0x01, 0x00]);
        assert!(db.add_fingerprint(fp.clone()));
        assert!(!db.add_fingerprint(fp));
        assert_eq!(db.fingerprint_count(), 1);
    }

    #[test]
    fn test_torn_index_is_rebuilt_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rug_db.json");
        let fp = sample_fp(&[0x60, 0x01, 0xff]);
        // duplicate fingerprints with an empty index
        let doc = serde_json::json!({
            "hashes": [],
            "fingerprints": [fp, fp],
            "_fpHashes": []
        });
        fs::write(&path, doc.to_string()).unwrap();

        let mut db = RugDatabase::open(&path);
        assert_eq!(db.fingerprint_count(), 1);
        assert!(!db.add_fingerprint(fp));
    }

    #[test]
    fn test_persist_detection_merges_other_writers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rug_db.json");

        let mut a = RugDatabase::open(&path);
        let mut b = RugDatabase::open(&path);

        assert!(a.persist_detection("0x01", sample_fp(&[0xf4])).unwrap());
        assert!(b.persist_detection("0x02", sample_fp(&[0xf5])).unwrap());

        let merged = RugDatabase::open(&path);
        assert!(merged.contains_hash("0x01"));
        assert!(merged.contains_hash("0x02"));
        assert_eq!(merged.fingerprint_count(), 2);

        // nothing new: no write
        assert!(!b.persist_detection("0x02", sample_fp(&[0xf5])).unwrap());
    }

    #[test]
    fn test_mixed_case_hashes_are_normalized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rug_db.json");
        let doc = serde_json::json!({
            "hashes": ["0xABCDEF0123"],
            "fingerprints": []
        });
        fs::write(&path, doc.to_string()).unwrap();

        let db = RugDatabase::open(&path);
        assert!(db.contains_hash("0xabcdef0123"));
        assert!(db.contains_hash("0xABCDEF0123"));

        let mut other = RugDatabase::in_memory();
        other.hashes.insert("0xFEED".to_string());
        let mut merged = RugDatabase::in_memory();
        merged.merge(other);
        assert!(merged.contains_hash("0xfeed"));
        assert_eq!(merged.hash_count(), 1);
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut db = RugDatabase::in_memory();
        db.add_hash("0x01");
        assert!(db.save().is_ok());
        assert!(db.path().is_none());
    }
}
