//! Publishes execution phases to the search attribute index.

use aisatsu_core::{ExecutionFilter, ExecutionInfo, Phase, SearchAttributeIndex, WorkflowId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Search attribute holding the phase of a hello execution.
pub const STATUS_SEARCH_ATTRIBUTE: &str = "OrgCustomStatus";

/// Best-effort writer and reader of the status search attribute.
///
/// Index failures and slow writes are logged and swallowed; they never fail
/// the owning execution.
#[derive(Debug, Clone)]
pub struct StatusProjector {
    index: Arc<dyn SearchAttributeIndex>,
    write_timeout: Duration,
}

impl StatusProjector {
    /// Creates a projector writing to `index`.
    pub fn new(index: Arc<dyn SearchAttributeIndex>, write_timeout: Duration) -> Self {
        Self {
            index,
            write_timeout,
        }
    }

    /// Writes `phase` for `id`, logging instead of failing.
    pub async fn project(&self, id: &WorkflowId, phase: Phase) {
        let write = self
            .index
            .upsert(id, STATUS_SEARCH_ATTRIBUTE, phase.as_str());
        match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => debug!(workflow_id = %id, "Projected status {}", phase),
            Ok(Err(e)) => warn!(workflow_id = %id, "Failed to project status {}: {}", phase, e),
            Err(_) => warn!(
                workflow_id = %id,
                "Projecting status {} timed out after {:?}", phase, self.write_timeout
            ),
        }
    }

    /// Returns the projected phase, or `Phase::Unknown` when nothing usable
    /// is indexed for `id`.
    pub async fn read(&self, id: &WorkflowId) -> Phase {
        match self.index.get(id, STATUS_SEARCH_ATTRIBUTE).await {
            Ok(Some(value)) => value.parse::<Phase>().unwrap_or_else(|e| {
                warn!(workflow_id = %id, "Ignoring unreadable status: {}", e);
                Phase::Unknown
            }),
            Ok(None) => Phase::Unknown,
            Err(e) => {
                warn!(workflow_id = %id, "Failed to read status: {}", e);
                Phase::Unknown
            }
        }
    }

    /// Lists indexed executions, empty when the index is unavailable.
    pub async fn list(&self, filter: &ExecutionFilter) -> Vec<ExecutionInfo> {
        self.index.list(filter).await.unwrap_or_else(|e| {
            warn!("Failed to list executions: {}", e);
            Vec::new()
        })
    }
}
