//! Job records and the items a job works through.

pub mod item;
pub mod record;

pub use item::{AffectedItem, ItemFailure, ItemOutcome};
pub use record::{progress_percent, JobId, JobRecord, JobStatus};
