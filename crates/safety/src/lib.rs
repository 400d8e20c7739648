//! Backup-before-write safety net.
//!
//! Every document is copied to `<backup_root>/<YYYY-MM-DD>/<vault-relative
//! path>` before the pipeline touches it, so any enrichment run can be rolled
//! back per file or per day.  Backup and prune failures are logged and
//! swallowed — they must never block forward progress.  Restore failures are
//! surfaced through return values because restoring is the operation's whole
//! point.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use notegarden_config::SafetyConfig;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct BackupVault {
    enabled: bool,
    retention_days: i64,
    backup_root: PathBuf,
    vault_root: PathBuf,
}

impl BackupVault {
    pub fn new(config: &SafetyConfig, vault_root: impl AsRef<Path>) -> Self {
        Self {
            enabled: config.enable_backup,
            retention_days: config.retention_days,
            backup_root: PathBuf::from(&config.backup_path),
            vault_root: vault_root.as_ref().to_path_buf(),
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Copy a document into today's backup directory, mirroring its
    /// vault-relative position and preserving its modification time.
    /// Returns `None` when backups are disabled, the source is missing, or
    /// the copy fails (logged, never fatal).
    pub fn backup(&self, file_path: &Path) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        if !file_path.exists() {
            warn!(path = %file_path.display(), "asked to back up a missing file");
            return None;
        }

        // Files outside the vault fall back to their bare filename.
        let rel_path = file_path
            .strip_prefix(&self.vault_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(file_path.file_name().unwrap_or_default()));

        let dest = self
            .backup_root
            .join(Local::now().date_naive().format(DATE_FORMAT).to_string())
            .join(&rel_path);

        match copy_preserving_mtime(file_path, &dest) {
            Ok(()) => {
                debug!(from = %file_path.display(), to = %dest.display(), "backed up");
                Some(dest)
            }
            Err(err) => {
                warn!(path = %file_path.display(), %err, "backup failed");
                None
            }
        }
    }

    /// Restore a document from its most recent backup, overwriting the live
    /// file.  "Most recent" is the lexicographically greatest matching path:
    /// date directories are `YYYY-MM-DD`, so this is the latest day (intra-day
    /// ties resolve by path order, not write time).
    pub fn restore_latest(&self, rel_path: &str) -> bool {
        if !self.backup_root.exists() {
            warn!("no backups recorded yet");
            return false;
        }

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.backup_root) {
            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                let candidate = entry.path().join(rel_path);
                if candidate.exists() {
                    candidates.push(candidate);
                }
            }
        }

        let Some(latest) = candidates.into_iter().max() else {
            warn!(rel_path, "no backup found for file");
            return false;
        };

        let target = self.vault_root.join(rel_path);
        match copy_preserving_mtime(&latest, &target) {
            Ok(()) => {
                info!(rel_path, from = %latest.display(), "restored");
                true
            }
            Err(err) => {
                warn!(rel_path, %err, "restore failed");
                false
            }
        }
    }

    /// Restore every file backed up on `date` to its vault position,
    /// continuing past individual failures.  Returns the number of files
    /// successfully restored; 0 when the date directory is absent.
    pub fn restore_by_date(&self, date: &str) -> usize {
        let date_dir = self.backup_root.join(date);
        if !date_dir.exists() {
            warn!(date, "no backup directory for date");
            return 0;
        }

        let mut count = 0;
        for entry in WalkDir::new(&date_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let Ok(rel) = entry.path().strip_prefix(&date_dir) else {
                continue;
            };
            let target = self.vault_root.join(rel);
            match copy_preserving_mtime(entry.path(), &target) {
                Ok(()) => {
                    debug!(path = %rel.display(), "restored");
                    count += 1;
                }
                Err(err) => {
                    warn!(path = %rel.display(), %err, "failed to restore file");
                }
            }
        }
        count
    }

    /// Delete date directories strictly older than `today - retention_days`.
    /// The boundary day itself is kept.  Non-date-named entries are left
    /// untouched; a non-positive retention disables pruning entirely.
    pub fn prune(&self) {
        if self.retention_days <= 0 || !self.backup_root.exists() {
            return;
        }

        let cutoff = Local::now().date_naive() - Duration::days(self.retention_days);
        let Ok(entries) = fs::read_dir(&self.backup_root) else {
            return;
        };

        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(dir_date) = NaiveDate::parse_from_str(&name, DATE_FORMAT) else {
                continue;
            };
            if dir_date < cutoff {
                info!(date = %name, "pruning expired backup directory");
                if let Err(err) = fs::remove_dir_all(entry.path()) {
                    warn!(date = %name, %err, "failed to prune backup directory");
                }
            }
        }
    }
}

fn copy_preserving_mtime(src: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;

    let mtime = fs::metadata(src)?.modified()?;
    File::options()
        .write(true)
        .open(dest)?
        .set_modified(mtime)?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault_with_note(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let note = dir.path().join("notes").join("a.md");
        fs::create_dir_all(note.parent().unwrap()).unwrap();
        fs::write(&note, content).unwrap();
        (dir, note)
    }

    fn backup_vault(vault: &TempDir, backups: &TempDir, retention_days: i64) -> BackupVault {
        let config = SafetyConfig {
            enable_backup: true,
            retention_days,
            backup_path: backups.path().to_string_lossy().into_owned(),
        };
        BackupVault::new(&config, vault.path())
    }

    #[test]
    fn backup_mirrors_relative_path_under_dated_dir() {
        let (vault, note) = vault_with_note("original\n");
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        let dest = vault_backup.backup(&note).expect("backup path");
        assert!(dest.ends_with("notes/a.md"));
        let today = Local::now().date_naive().format(DATE_FORMAT).to_string();
        assert!(dest.to_string_lossy().contains(&today));
        assert_eq!(fs::read_to_string(dest).unwrap(), "original\n");
    }

    #[test]
    fn backup_disabled_returns_none() {
        let (vault, note) = vault_with_note("x\n");
        let backups = TempDir::new().unwrap();
        let config = SafetyConfig {
            enable_backup: false,
            retention_days: 7,
            backup_path: backups.path().to_string_lossy().into_owned(),
        };
        let vault_backup = BackupVault::new(&config, vault.path());

        assert!(vault_backup.backup(&note).is_none());
        assert!(fs::read_dir(backups.path()).unwrap().next().is_none());
    }

    #[test]
    fn backup_missing_source_returns_none() {
        let vault = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        assert!(vault_backup.backup(&vault.path().join("ghost.md")).is_none());
    }

    #[test]
    fn backup_restore_roundtrip_is_byte_identical() {
        let (vault, note) = vault_with_note("before mutation\n");
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        vault_backup.backup(&note).unwrap();
        fs::write(&note, "after mutation\n").unwrap();

        assert!(vault_backup.restore_latest("notes/a.md"));
        assert_eq!(fs::read_to_string(&note).unwrap(), "before mutation\n");
    }

    #[test]
    fn restore_latest_picks_greatest_date() {
        let (vault, note) = vault_with_note("live\n");
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        for (date, content) in [("2026-07-01", "older\n"), ("2026-07-20", "newer\n")] {
            let dest = backups.path().join(date).join("notes/a.md");
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::write(dest, content).unwrap();
        }

        assert!(vault_backup.restore_latest("notes/a.md"));
        assert_eq!(fs::read_to_string(&note).unwrap(), "newer\n");
    }

    #[test]
    fn restore_latest_without_backup_fails() {
        let vault = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        assert!(!vault_backup.restore_latest("notes/a.md"));
    }

    #[test]
    fn restore_by_date_restores_all_files() {
        let vault = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        let day = backups.path().join("2026-08-01");
        for rel in ["a.md", "sub/b.md"] {
            let p = day.join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, format!("{rel} content\n")).unwrap();
        }

        assert_eq!(vault_backup.restore_by_date("2026-08-01"), 2);
        assert_eq!(
            fs::read_to_string(vault.path().join("sub/b.md")).unwrap(),
            "sub/b.md content\n"
        );
    }

    #[test]
    fn restore_by_date_missing_directory_returns_zero() {
        let vault = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        assert_eq!(vault_backup.restore_by_date("1999-01-01"), 0);
    }

    #[test]
    fn prune_removes_only_expired_date_dirs() {
        let vault = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        let today = Local::now().date_naive();
        let expired = (today - Duration::days(10)).format(DATE_FORMAT).to_string();
        let boundary = (today - Duration::days(7)).format(DATE_FORMAT).to_string();
        let fresh = today.format(DATE_FORMAT).to_string();

        for name in [&expired, &boundary, &fresh] {
            fs::create_dir_all(backups.path().join(name)).unwrap();
        }
        fs::create_dir_all(backups.path().join("not-a-date")).unwrap();

        vault_backup.prune();

        assert!(!backups.path().join(&expired).exists());
        // The boundary day is kept: only strictly older directories go.
        assert!(backups.path().join(&boundary).exists());
        assert!(backups.path().join(&fresh).exists());
        assert!(backups.path().join("not-a-date").exists());
    }

    #[test]
    fn prune_disabled_by_nonpositive_retention() {
        let vault = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 0);

        let old = backups.path().join("2000-01-01");
        fs::create_dir_all(&old).unwrap();
        vault_backup.prune();
        assert!(old.exists());
    }

    #[test]
    fn backup_preserves_mtime() {
        let (vault, note) = vault_with_note("content\n");
        let backups = TempDir::new().unwrap();
        let vault_backup = backup_vault(&vault, &backups, 7);

        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(86_400);
        File::options()
            .write(true)
            .open(&note)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let dest = vault_backup.backup(&note).unwrap();
        let src_mtime = fs::metadata(&note).unwrap().modified().unwrap();
        let dest_mtime = fs::metadata(&dest).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dest_mtime);
    }
}
