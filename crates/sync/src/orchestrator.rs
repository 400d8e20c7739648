//! The synchronization control loop.
//!
//! One document at a time, end to end: backup, load, learn pre-existing
//! tags, generate and filter suggestions, retrieve neighbours, generate an
//! insight, save, reindex.  Each document is processed in strict isolation —
//! an error is reported and the loop moves on, so one broken note never
//! corrupts another's progress.  Dry runs take every decision and emit every
//! event but commit no durable mutation.

use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use notegarden_index::{NewEntry, SemanticIndex};
use notegarden_llm::{GenerationClient, RelatedDocument};
use notegarden_safety::BackupVault;
use notegarden_tags::VocabularyStore;
use notegarden_vault::{Document, VaultError, VaultScanner};

use crate::cursor::{ChangeCursor, now_timestamp};
use crate::events::{SyncEvent, SyncObserver};

#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub changed: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InitSummary {
    pub scanned: usize,
    pub indexed: usize,
}

enum Outcome {
    Processed,
    Skipped,
}

pub struct SyncOrchestrator {
    scanner: VaultScanner,
    backups: BackupVault,
    vocabulary: VocabularyStore,
    index: SemanticIndex,
    generator: GenerationClient,
    cursor: ChangeCursor,
    retrieval_k: usize,
    dry_run: bool,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: VaultScanner,
        backups: BackupVault,
        vocabulary: VocabularyStore,
        index: SemanticIndex,
        generator: GenerationClient,
        cursor: ChangeCursor,
        retrieval_k: usize,
        dry_run: bool,
    ) -> Self {
        Self {
            scanner,
            backups,
            vocabulary,
            index,
            generator,
            cursor,
            retrieval_k,
            dry_run,
        }
    }

    /// Full scan and index build.  `force` resets the index first.  Documents
    /// that cannot be read or are empty are skipped with a warning; the rest
    /// are indexed with their complete on-disk text.
    pub async fn run_init(&mut self, force: bool) -> Result<InitSummary> {
        if force {
            warn!("force mode: resetting the semantic index");
            self.index.reset()?;
        }

        let files = self.scanner.scan_all();
        info!(count = files.len(), "full vault scan complete");

        let mut entries = Vec::new();
        for path in &files {
            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot read document, skipping");
                    continue;
                }
            };
            if raw.trim().is_empty() {
                continue;
            }
            entries.push(NewEntry {
                text: raw,
                source: file_name_of(path),
                path: path.display().to_string(),
            });
        }

        let indexed = entries.len();
        self.index.upsert(entries).await?;
        self.cursor.advance(now_timestamp())?;

        Ok(InitSummary {
            scanned: files.len(),
            indexed,
        })
    }

    /// Incremental pass over every document modified since the last
    /// successful run.
    pub async fn run_update(&mut self, observer: &mut dyn SyncObserver) -> Result<SyncSummary> {
        if !self.dry_run {
            self.backups.prune();
        }

        let since = self.cursor.load();
        let changed = self.scanner.scan_changed(since);
        observer.notify(SyncEvent::PassStarted {
            changed: changed.len(),
            dry_run: self.dry_run,
        });

        let mut summary = SyncSummary {
            changed: changed.len(),
            ..SyncSummary::default()
        };

        for path in &changed {
            observer.notify(SyncEvent::DocumentStarted { path: path.clone() });
            match self.process_document(path, observer).await {
                Ok(Outcome::Processed) => summary.processed += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(path = %path.display(), %err, "document failed, continuing");
                    observer.notify(SyncEvent::DocumentFailed {
                        path: path.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if !self.dry_run {
            self.cursor.advance(now_timestamp())?;
        }

        observer.notify(SyncEvent::PassCompleted {
            processed: summary.processed,
            skipped: summary.skipped,
            failed: summary.failed,
            dry_run: self.dry_run,
        });
        Ok(summary)
    }

    async fn process_document(
        &mut self,
        path: &Path,
        observer: &mut dyn SyncObserver,
    ) -> Result<Outcome> {
        if !self.dry_run {
            self.backups.backup(path);
        }

        let mut doc = match Document::load(path) {
            Ok(doc) => doc,
            Err(err @ VaultError::Parse { .. }) => {
                observer.notify(SyncEvent::DocumentSkipped {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
                return Ok(Outcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        };

        // Learn tags the user wrote by hand before we ever saw this note.
        if !self.dry_run {
            for tag in doc.tags() {
                let tag = tag.trim().to_string();
                if tag.is_empty()
                    || self.vocabulary.is_allowed(&tag)
                    || self.vocabulary.is_forbidden(&tag)
                {
                    continue;
                }
                if self.vocabulary.add_allowed(&tag)? {
                    observer.notify(SyncEvent::TagLearned { tag });
                }
            }
        }

        if doc.body().trim().is_empty() {
            observer.notify(SyncEvent::DocumentSkipped {
                path: path.to_path_buf(),
                reason: "empty body".to_string(),
            });
            return Ok(Outcome::Skipped);
        }

        // Suggest tags, then drop anything blacklisted.
        let known = self.vocabulary.allowed();
        let suggested = self.generator.generate_tags(doc.body(), &known).await?;
        let valid: Vec<String> = suggested
            .iter()
            .filter(|tag| !self.vocabulary.is_forbidden(tag))
            .cloned()
            .collect();
        if valid.len() < suggested.len() {
            observer.notify(SyncEvent::ForbiddenFiltered {
                path: path.to_path_buf(),
                dropped: suggested.len() - valid.len(),
            });
        }
        observer.notify(SyncEvent::TagsSuggested {
            path: path.to_path_buf(),
            tags: valid.clone(),
        });

        if doc.update_tags(&valid) {
            observer.notify(SyncEvent::TagsApplied {
                path: path.to_path_buf(),
                tags: doc.tags(),
            });
            // Applied suggestions become known tags so future prompts see them.
            if !self.dry_run {
                for tag in &valid {
                    self.vocabulary.add_allowed(tag)?;
                }
            }
        }

        // Nearest neighbours, minus the document itself.
        let file_name = doc.file_name();
        let related: Vec<RelatedDocument> = self
            .index
            .search(doc.body(), self.retrieval_k)
            .await?
            .into_iter()
            .filter(|hit| hit.source != file_name)
            .map(|hit| RelatedDocument {
                source: hit.source,
                path: hit.path,
                content: hit.text,
            })
            .collect();

        if !related.is_empty() {
            observer.notify(SyncEvent::RelatedFound {
                path: path.to_path_buf(),
                sources: related.iter().map(|doc| doc.source.clone()).collect(),
            });

            let insight = self
                .generator
                .generate_insight(&doc.title(), doc.body(), &related)
                .await?;
            if !insight.is_empty() {
                doc.append_section(&insight);
                observer.notify(SyncEvent::InsightAppended {
                    path: path.to_path_buf(),
                });
            }
        }

        if !self.dry_run {
            doc.save()?;
            observer.notify(SyncEvent::DocumentSaved {
                path: path.to_path_buf(),
            });

            // The save already stuck; an index failure here is reported but
            // must not undo the document's progress.
            let entry = NewEntry {
                text: doc.body().to_string(),
                source: file_name,
                path: path.display().to_string(),
            };
            if let Err(err) = self.index.upsert(vec![entry]).await {
                warn!(path = %path.display(), %err, "index upsert failed");
                observer.notify(SyncEvent::IndexFailed {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
            }
        }

        Ok(Outcome::Processed)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────────────────────────
