//! Traits of the durable execution substrate.
//!
//! The workflow runtime only talks to storage through these two traits, so a
//! real orchestration backend can replace the in-memory implementations.

use crate::error::{ProjectionError, StoreError};
use crate::history::HistoryEvent;
use crate::types::WorkflowId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Durable, append-only event history keyed by workflow id.
///
/// Implementations must apply each append exactly once and keep appends of
/// one id in order.
#[async_trait]
pub trait HistoryStore: Send + Sync + Debug {
    /// Creates the history of a new execution with its first event.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the id is taken.
    async fn create(&self, id: &WorkflowId, started: HistoryEvent) -> Result<(), StoreError>;

    /// Appends an event and returns its sequence number (0-based).
    async fn append(&self, id: &WorkflowId, event: HistoryEvent) -> Result<u64, StoreError>;

    /// Reads the full history of an execution.
    async fn read(&self, id: &WorkflowId) -> Result<Vec<HistoryEvent>, StoreError>;

    /// Lists every id with a history, in id order.
    async fn list_ids(&self) -> Result<Vec<WorkflowId>, StoreError>;
}

/// One execution as seen through the search attribute index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionInfo {
    /// Execution identifier.
    pub id: WorkflowId,
    /// Indexed attributes, keyed by name.
    pub search_attributes: BTreeMap<String, String>,
}

/// Selects executions in [`SearchAttributeIndex::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFilter {
    All,
    WorkflowId(WorkflowId),
    SearchAttribute { key: String, value: String },
}

impl ExecutionFilter {
    /// Returns `true` if `info` is selected by this filter.
    pub fn matches(&self, info: &ExecutionInfo) -> bool {
        match self {
            ExecutionFilter::All => true,
            ExecutionFilter::WorkflowId(id) => &info.id == id,
            ExecutionFilter::SearchAttribute { key, value } => {
                info.search_attributes.get(key) == Some(value)
            }
        }
    }
}

/// External key-value index of search attributes.
///
/// Writes are last-write-wins per `(id, key)` and may become visible with a
/// delay.
#[async_trait]
pub trait SearchAttributeIndex: Send + Sync + Debug {
    async fn upsert(&self, id: &WorkflowId, key: &str, value: &str) -> Result<(), ProjectionError>;

    async fn get(&self, id: &WorkflowId, key: &str) -> Result<Option<String>, ProjectionError>;

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionInfo>, ProjectionError>;
}
