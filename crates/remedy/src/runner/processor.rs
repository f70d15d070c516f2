use std::future::Future;

use async_trait::async_trait;

use crate::error::JobFault;
use crate::job::{AffectedItem, ItemOutcome};

/// Performs the remediation for one affected item.
///
/// `Ok` carries the item-level result; a failed or skipped item never stops
/// the batch. `Err(JobFault)` means the whole job cannot continue.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, item: &AffectedItem) -> Result<ItemOutcome, JobFault>;
}

/// Processor backed by an async closure.
pub struct FnProcessor<F> {
    f: F,
}

/// Wraps an async closure as an [`ItemProcessor`]. The closure receives an
/// owned copy of each item.
pub fn processor_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(AffectedItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ItemOutcome, JobFault>> + Send,
{
    FnProcessor { f }
}

#[async_trait]
impl<F, Fut> ItemProcessor for FnProcessor<F>
where
    F: Fn(AffectedItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ItemOutcome, JobFault>> + Send,
{
    async fn process(&self, item: &AffectedItem) -> Result<ItemOutcome, JobFault> {
        (self.f)(item.clone()).await
    }
}
