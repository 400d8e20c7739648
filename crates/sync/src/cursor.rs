//! The change cursor: a single plain-text file holding the Unix timestamp of
//! the last successful synchronization pass.  Absent or unreadable means
//! "never ran" and every document counts as changed.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ChangeCursor {
    path: PathBuf,
}

impl ChangeCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Timestamp of the last successful pass, 0.0 when none is recorded.
    pub fn load(&self) -> f64 {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return 0.0;
        };
        match raw.trim().parse::<f64>() {
            Ok(timestamp) => timestamp,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "unreadable cursor, rescanning everything");
                0.0
            }
        }
    }

    /// Record a successful pass.  Called only after non-dry-run completion.
    pub fn advance(&self, timestamp: f64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, timestamp.to_string())
            .with_context(|| format!("writing cursor file {}", self.path.display()))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_cursor_reads_as_epoch() {
        let dir = TempDir::new().unwrap();
        let cursor = ChangeCursor::new(dir.path().join("last_run"));
        assert_eq!(cursor.load(), 0.0);
        assert!(!cursor.exists());
    }

    #[test]
    fn advance_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let cursor = ChangeCursor::new(dir.path().join("state/last_run"));

        cursor.advance(1754300000.5).unwrap();
        assert_eq!(cursor.load(), 1754300000.5);
    }

    #[test]
    fn garbage_cursor_reads_as_epoch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_run");
        fs::write(&path, "definitely not a float").unwrap();

        let cursor = ChangeCursor::new(path);
        assert_eq!(cursor.load(), 0.0);
    }
}
