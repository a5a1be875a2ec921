//! In-memory durable substrate.
//!
//! Events are kept JSON-encoded, the way a persistent backend would store
//! them, so nothing that survives a worker restart shares memory with a live
//! execution.

use aisatsu_core::{
    ExecutionFilter, ExecutionInfo, HistoryEvent, HistoryStore, ProjectionError,
    SearchAttributeIndex, StoreError, WorkflowId,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// History store keeping every execution's events in memory.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    histories: RwLock<BTreeMap<WorkflowId, Vec<String>>>,
}

impl InMemoryHistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn encode(event: &HistoryEvent) -> Result<String, StoreError> {
    serde_json::to_string(event).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode(raw: &str) -> Result<HistoryEvent, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Codec(e.to_string()))
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create(&self, id: &WorkflowId, started: HistoryEvent) -> Result<(), StoreError> {
        let encoded = encode(&started)?;
        let mut histories = self.histories.write().await;
        if histories.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        histories.insert(id.clone(), vec![encoded]);
        Ok(())
    }

    async fn append(&self, id: &WorkflowId, event: HistoryEvent) -> Result<u64, StoreError> {
        let encoded = encode(&event)?;
        let mut histories = self.histories.write().await;
        let history = histories
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        history.push(encoded);
        Ok(history.len() as u64 - 1)
    }

    async fn read(&self, id: &WorkflowId) -> Result<Vec<HistoryEvent>, StoreError> {
        let histories = self.histories.read().await;
        let history = histories
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        history.iter().map(|raw| decode(raw)).collect()
    }

    async fn list_ids(&self) -> Result<Vec<WorkflowId>, StoreError> {
        Ok(self.histories.read().await.keys().cloned().collect())
    }
}

/// Search attribute index with last-write-wins semantics per key.
#[derive(Debug, Default)]
pub struct InMemorySearchAttributeIndex {
    attributes: RwLock<BTreeMap<WorkflowId, BTreeMap<String, String>>>,
    upserts: AtomicUsize,
}

impl InMemorySearchAttributeIndex {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes received since creation.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchAttributeIndex for InMemorySearchAttributeIndex {
    async fn upsert(&self, id: &WorkflowId, key: &str, value: &str) -> Result<(), ProjectionError> {
        self.attributes
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, id: &WorkflowId, key: &str) -> Result<Option<String>, ProjectionError> {
        Ok(self
            .attributes
            .read()
            .await
            .get(id)
            .and_then(|attributes| attributes.get(key).cloned()))
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionInfo>, ProjectionError> {
        Ok(self
            .attributes
            .read()
            .await
            .iter()
            .map(|(id, attributes)| ExecutionInfo {
                id: id.clone(),
                search_attributes: attributes.clone(),
            })
            .filter(|info| filter.matches(info))
            .collect())
    }
}
