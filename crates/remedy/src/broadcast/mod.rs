//! Broadcasting of job record changes for push-based observers.

pub mod job_updates;

pub use job_updates::{JobSubscription, JobUpdateBroadcaster};
