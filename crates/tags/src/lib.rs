//! Tag vocabulary governance.
//!
//! Two disjoint sets of tag strings — ALLOWED (the whitelist of known tags)
//! and FORBIDDEN (the blacklist) — persisted as sorted, pretty-printed JSON
//! string arrays.  Mutual exclusion is the load-bearing invariant: adding a
//! tag to FORBIDDEN evicts it from ALLOWED, and a forbidden tag can never be
//! re-admitted without an explicit blacklist removal first.
//!
//! Every successful mutation is flushed to disk immediately via a tmp-file +
//! rename, so a crash between mutations never leaves a half-written file.
//! Write amplification is acceptable: tag mutations are rare.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

#[derive(Debug)]
pub struct VocabularyStore {
    allowed: BTreeSet<String>,
    forbidden: BTreeSet<String>,
    allowed_path: PathBuf,
    forbidden_path: PathBuf,
}

impl VocabularyStore {
    /// Load both vocabulary files, creating them as empty arrays when absent.
    /// A file that exists but cannot be parsed is logged and treated as
    /// empty rather than blocking the run.
    pub fn open(
        allowed_path: impl Into<PathBuf>,
        forbidden_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let allowed_path = allowed_path.into();
        let forbidden_path = forbidden_path.into();
        let allowed = load_or_create(&allowed_path)?;
        let forbidden = load_or_create(&forbidden_path)?;
        Ok(Self {
            allowed,
            forbidden,
            allowed_path,
            forbidden_path,
        })
    }

    /// Sorted list of known tags.
    pub fn allowed(&self) -> Vec<String> {
        self.allowed.iter().cloned().collect()
    }

    /// Sorted list of blacklisted tags.
    pub fn forbidden(&self) -> Vec<String> {
        self.forbidden.iter().cloned().collect()
    }

    pub fn is_allowed(&self, tag: &str) -> bool {
        self.allowed.contains(tag)
    }

    pub fn is_forbidden(&self, tag: &str) -> bool {
        self.forbidden.contains(tag)
    }

    /// Add a tag to ALLOWED.  Returns `Ok(false)` without mutation when the
    /// tag is blank after trimming, already known, or blacklisted.
    pub fn add_allowed(&mut self, tag: &str) -> Result<bool> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(false);
        }
        if self.forbidden.contains(tag) {
            warn!(tag, "refusing to whitelist a blacklisted tag");
            return Ok(false);
        }
        if !self.allowed.insert(tag.to_string()) {
            return Ok(false);
        }
        persist(&self.allowed_path, &self.allowed)?;
        Ok(true)
    }

    pub fn remove_allowed(&mut self, tag: &str) -> Result<bool> {
        if !self.allowed.remove(tag) {
            return Ok(false);
        }
        persist(&self.allowed_path, &self.allowed)?;
        Ok(true)
    }

    /// Add a tag to FORBIDDEN.  Idempotent; on success the tag is also
    /// evicted from ALLOWED to keep the sets disjoint.
    pub fn add_forbidden(&mut self, tag: &str) -> Result<bool> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(false);
        }
        if !self.forbidden.insert(tag.to_string()) {
            return Ok(false);
        }
        persist(&self.forbidden_path, &self.forbidden)?;

        if self.allowed.remove(tag) {
            warn!(tag, "tag moved from whitelist to blacklist");
            persist(&self.allowed_path, &self.allowed)?;
        }
        Ok(true)
    }

    pub fn remove_forbidden(&mut self, tag: &str) -> Result<bool> {
        if !self.forbidden.remove(tag) {
            return Ok(false);
        }
        persist(&self.forbidden_path, &self.forbidden)?;
        Ok(true)
    }
}

fn load_or_create(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        let empty = BTreeSet::new();
        persist(path, &empty)?;
        return Ok(empty);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading vocabulary file {}", path.display()))?;
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(tags) => Ok(tags.into_iter().collect()),
        Err(err) => {
            warn!(path = %path.display(), %err, "vocabulary file unreadable, treating as empty");
            Ok(BTreeSet::new())
        }
    }
}

/// Write the set as a sorted, pretty-printed JSON array.  Tmp-file + rename
/// keeps each mutation atomic and independent.
fn persist(path: &Path, tags: &BTreeSet<String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let sorted: Vec<&String> = tags.iter().collect();
    let rendered = serde_json::to_string_pretty(&sorted)?;

    let tmp_path = {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "tags.json".to_string());
        path.with_file_name(format!("{filename}.tmp"))
    };

    if let Err(err) = fs::write(&tmp_path, rendered) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("writing vocabulary file {}", path.display()));
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replacing vocabulary file {}", path.display()))?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> VocabularyStore {
        VocabularyStore::open(
            dir.path().join("tags.json"),
            dir.path().join("tags_blacklist.json"),
        )
        .unwrap()
    }

    #[test]
    fn open_creates_empty_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.allowed().is_empty());
        assert!(store.forbidden().is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("tags.json")).unwrap().trim(),
            "[]"
        );
    }

    #[test]
    fn add_allowed_rejects_blank_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert!(!store.add_allowed("   ").unwrap());
        assert!(store.add_allowed("rust").unwrap());
        assert!(!store.add_allowed("rust").unwrap());
        assert!(!store.add_allowed("  rust  ").unwrap(), "trimmed duplicate");
        assert_eq!(store.allowed(), vec!["rust"]);
    }

    #[test]
    fn forbidden_and_allowed_are_mutually_exclusive() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert!(store.add_allowed("noise").unwrap());
        assert!(store.add_forbidden("noise").unwrap());

        assert!(!store.is_allowed("noise"));
        assert!(store.is_forbidden("noise"));
        // A blacklisted tag can never be re-admitted.
        assert!(!store.add_allowed("noise").unwrap());
    }

    #[test]
    fn add_forbidden_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert!(store.add_forbidden("spam").unwrap());
        assert!(!store.add_forbidden("spam").unwrap());
    }

    #[test]
    fn remove_then_readd_allowed() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store.add_forbidden("temp").unwrap();
        assert!(store.remove_forbidden("temp").unwrap());
        assert!(store.add_allowed("temp").unwrap());
        assert!(store.is_allowed("temp"));
    }

    #[test]
    fn mutations_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open_store(&dir);
            store.add_allowed("beta").unwrap();
            store.add_allowed("alpha").unwrap();
            store.add_forbidden("junk").unwrap();
        }

        let store = open_store(&dir);
        assert_eq!(store.allowed(), vec!["alpha", "beta"]);
        assert_eq!(store.forbidden(), vec!["junk"]);
    }

    #[test]
    fn files_are_sorted_json_arrays() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.add_allowed("zebra").unwrap();
        store.add_allowed("apple").unwrap();

        let raw = fs::read_to_string(dir.path().join("tags.json")).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec!["apple", "zebra"]);
        // Pretty-printed, one entry per line.
        assert!(raw.contains("\n"));
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tags.json"), "{not json").unwrap();

        let store = open_store(&dir);
        assert!(store.allowed().is_empty());
    }

    #[test]
    fn remove_missing_tag_reports_false() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        assert!(!store.remove_allowed("ghost").unwrap());
        assert!(!store.remove_forbidden("ghost").unwrap());
    }
}
