pub mod cursor;
pub mod events;
pub mod orchestrator;

pub use cursor::{ChangeCursor, now_timestamp};
pub use events::{RecordingObserver, SyncEvent, SyncObserver};
pub use orchestrator::{InitSummary, SyncOrchestrator, SyncSummary};
