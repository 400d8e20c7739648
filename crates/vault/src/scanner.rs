//! Recursive vault traversal and change detection.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::warn;
use walkdir::WalkDir;

/// Directory names excluded from every scan, matched exactly per path
/// segment: version control, the note editor's own state, trash, notegarden
/// state (backups, index, cursor), system logs, and template folders.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".obsidian",
    ".trash",
    ".notegarden",
    "System",
    "templates",
    "Templates",
];

#[derive(Debug, Clone)]
pub struct VaultScanner {
    root: PathBuf,
}

impl VaultScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every Markdown document under the root, ignore-set applied.
    /// Traversal order is filesystem order; callers must not depend on it.
    pub fn scan_all(&self) -> Vec<PathBuf> {
        self.walk_documents().collect()
    }

    /// Documents whose modification time is strictly greater than `since`
    /// (Unix seconds).
    pub fn scan_changed(&self, since: f64) -> Vec<PathBuf> {
        self.walk_documents()
            .filter(|path| match mtime_seconds(path) {
                Some(mtime) => mtime > since,
                None => false,
            })
            .collect()
    }

    fn walk_documents(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| {
                // Prune ignored directories so nothing below them is visited.
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !IGNORED_DIRS.contains(&name.as_ref())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(%err, "skipping unreadable entry during vault scan");
                    None
                }
            })
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "md")
            })
            .map(|entry| entry.into_path())
    }
}

/// File mtime as Unix seconds, `None` when metadata is unreadable.
pub fn mtime_seconds(path: &Path) -> Option<f64> {
    let modified = match path.metadata().and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read mtime");
            return None;
        }
    };
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}

// ── Tests ────────────────────────────────────────────────────────────────────
