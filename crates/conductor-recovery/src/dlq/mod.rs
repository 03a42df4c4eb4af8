//! Dead letter queue for permanently failed work.

mod entry;
mod notifier;
mod processor;
mod queue;
mod store;

pub use entry::{DlqEntry, DlqFilter, DlqStats, ErrorDetails};
pub use notifier::{DlqNotifier, LogNotifier, NotificationKind, WebhookNotifier};
pub use processor::{BacklogReport, DlqProcessor, DlqProcessorStats, DlqProcessorStatus};
pub use queue::DeadLetterQueue;
pub use store::{DlqStorage, EntryUpdate, FileDlqStore, MemoryDlqStore};
