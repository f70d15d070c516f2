use serde::{Deserialize, Serialize};

/// One unit of work targeted by a job (e.g. one product).
///
/// The payload is opaque to the job core and only interpreted by the
/// [`crate::runner::ItemProcessor`] supplied by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedItem {
    /// Identifier reported in failure lists.
    pub id: String,
    /// Human-readable label shown as the job's current item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AffectedItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Label if present, otherwise the id.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Result of processing a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Failed(String),
    /// Nothing to do for this item.
    Skipped(String),
}

impl ItemOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ItemOutcome::Failed(reason.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        ItemOutcome::Skipped(reason.into())
    }
}

/// A failed item and the reason the processor gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub item_id: String,
    pub reason: String,
}
