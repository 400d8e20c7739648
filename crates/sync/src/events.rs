//! Structured observations emitted by the orchestrator.
//!
//! The pipeline reports every decision as a [`SyncEvent`] instead of printing
//! directly; the CLI installs a console reporter and tests install
//! [`RecordingObserver`].  Dry runs emit the same events as live runs — only
//! persistence differs.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PassStarted {
        changed: usize,
        dry_run: bool,
    },
    DocumentStarted {
        path: PathBuf,
    },
    /// Document intentionally not processed (parse failure, empty body).
    DocumentSkipped {
        path: PathBuf,
        reason: String,
    },
    /// A tag found in the document joined the whitelist (learning).
    TagLearned {
        tag: String,
    },
    /// Backend suggestions after blacklist filtering.
    TagsSuggested {
        path: PathBuf,
        tags: Vec<String>,
    },
    /// Suggestions dropped by the blacklist.
    ForbiddenFiltered {
        path: PathBuf,
        dropped: usize,
    },
    /// The merged tag list actually applied to the document.
    TagsApplied {
        path: PathBuf,
        tags: Vec<String>,
    },
    RelatedFound {
        path: PathBuf,
        sources: Vec<String>,
    },
    InsightAppended {
        path: PathBuf,
    },
    DocumentSaved {
        path: PathBuf,
    },
    /// Index upsert failed after the document was saved; non-fatal.
    IndexFailed {
        path: PathBuf,
        message: String,
    },
    /// Unexpected error; the document made no durable progress.
    DocumentFailed {
        path: PathBuf,
        message: String,
    },
    PassCompleted {
        processed: usize,
        skipped: usize,
        failed: usize,
        dry_run: bool,
    },
}

pub trait SyncObserver {
    fn notify(&mut self, event: SyncEvent);
}

/// Collects events in order; used by tests and quiet runs.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<SyncEvent>,
}

impl SyncObserver for RecordingObserver {
    fn notify(&mut self, event: SyncEvent) {
        self.events.push(event);
    }
}
