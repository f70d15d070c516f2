//! Builders for creating test jobs programmatically.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use remedy::{AffectedItem, ItemOutcome, ItemProcessor, JobFault, JobRecord};

/// Id of the `index`-th item produced by [`items`].
pub fn item_id(index: usize) -> String {
    format!("item-{}", index)
}

/// `count` affected items with ids `item-0..` and product labels.
pub fn items(count: usize) -> Vec<AffectedItem> {
    (0..count)
        .map(|i| {
            AffectedItem::new(item_id(i))
                .with_label(format!("Product {}", i))
                .with_payload(serde_json::json!({ "productId": 1000 + i }))
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Behavior {
    Fail(String),
    Skip(String),
    Fault(String),
}

/// Builder for a processor whose outcome per item index is fixed up front.
/// Unlisted items succeed.
pub struct ProcessorBuilder {
    behaviors: HashMap<String, Behavior>,
    delay: Option<Duration>,
}

impl ProcessorBuilder {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            delay: None,
        }
    }

    /// The item at `index` fails with an item-level error.
    pub fn fail_at(mut self, index: usize) -> Self {
        self.behaviors.insert(
            item_id(index),
            Behavior::Fail(format!("AI returned no content for item {}", index)),
        );
        self
    }

    /// The item at `index` is skipped.
    pub fn skip_at(mut self, index: usize) -> Self {
        self.behaviors.insert(
            item_id(index),
            Behavior::Skip("already optimized".to_string()),
        );
        self
    }

    /// Processing the item at `index` raises a job-level fault.
    pub fn fault_at(mut self, index: usize, message: &str) -> Self {
        self.behaviors
            .insert(item_id(index), Behavior::Fault(message.to_string()));
        self
    }

    /// Every item takes this long.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn build(self) -> ScriptedProcessor {
        ScriptedProcessor {
            behaviors: self.behaviors,
            delay: self.delay,
        }
    }
}

pub struct ScriptedProcessor {
    behaviors: HashMap<String, Behavior>,
    delay: Option<Duration>,
}

#[async_trait]
impl ItemProcessor for ScriptedProcessor {
    async fn process(&self, item: &AffectedItem) -> Result<ItemOutcome, JobFault> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.behaviors.get(&item.id) {
            None => Ok(ItemOutcome::Success),
            Some(Behavior::Fail(reason)) => Ok(ItemOutcome::failed(reason.clone())),
            Some(Behavior::Skip(reason)) => Ok(ItemOutcome::skipped(reason.clone())),
            Some(Behavior::Fault(message)) => Err(JobFault::new(message.clone())),
        }
    }
}

/// A processing record with `processed` successful items out of `total`.
pub fn processing_record(target_key: &str, total: u32, processed: u32) -> JobRecord {
    let mut record = JobRecord::new(target_key, total);
    record.start().unwrap();
    for i in 0..processed as usize {
        record
            .record_outcome(&item_id(i), &ItemOutcome::Success)
            .unwrap();
    }
    record
}
