//! Console presentation of sync events.

use notegarden_sync::{SyncEvent, SyncObserver};

/// Prints each pipeline decision as it happens.  Dry runs and live runs
/// produce the same lines; only the header differs.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl SyncObserver for ConsoleReporter {
    fn notify(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::PassStarted { changed, dry_run } => {
                if dry_run {
                    println!("mode: DRY RUN (no files will be modified)");
                }
                if changed == 0 {
                    println!("no changes found");
                } else {
                    println!("found {changed} changed document(s)");
                }
            }
            SyncEvent::DocumentStarted { path } => {
                println!();
                println!("processing {}", path.display());
            }
            SyncEvent::DocumentSkipped { reason, .. } => {
                println!("  skipped: {reason}");
            }
            SyncEvent::TagLearned { tag } => {
                println!("  learned tag '{tag}'");
            }
            SyncEvent::ForbiddenFiltered { dropped, .. } => {
                println!("  filtered {dropped} blacklisted tag(s)");
            }
            SyncEvent::TagsSuggested { tags, .. } => {
                if tags.is_empty() {
                    println!("  no tag suggestions");
                } else {
                    println!("  suggested tags: {}", tags.join(", "));
                }
            }
            SyncEvent::TagsApplied { tags, .. } => {
                println!("  tags updated: {}", tags.join(", "));
            }
            SyncEvent::RelatedFound { sources, .. } => {
                println!("  related notes: {}", sources.join(", "));
            }
            SyncEvent::InsightAppended { .. } => {
                println!("  insight appended");
            }
            SyncEvent::DocumentSaved { .. } => {
                println!("  saved");
            }
            SyncEvent::IndexFailed { message, .. } => {
                eprintln!("  index update failed: {message}");
            }
            SyncEvent::DocumentFailed { path, message } => {
                eprintln!("error processing {}: {message}", path.display());
            }
            SyncEvent::PassCompleted {
                processed,
                skipped,
                failed,
                dry_run,
            } => {
                println!();
                println!(
                    "done: {processed} processed, {skipped} skipped, {failed} failed{}",
                    if dry_run { " (dry run)" } else { "" }
                );
            }
        }
    }
}
