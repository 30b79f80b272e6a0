//! Resume capability for harvests
//!
//! Checkpoints with atomic writes and file locking, plus the error journal
//! that records work units which failed terminally.

pub mod atomic;
pub mod checkpoint;
pub mod journal;
pub mod lock;
pub mod state;

pub use checkpoint::{DateSet, ForecastProgress, HistoricalProgress};
pub use journal::{extract_url, ErrorJournal, JournalEntry};
pub use lock::{with_lock, LockMode};
pub use state::{ProgressStore, ResumeError, SCHEMA_VERSION};
