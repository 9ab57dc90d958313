//! In-process result backend.

use super::error::Result;
use super::Backend;
use crate::core::TaskState;
use async_trait::async_trait;
use dashmap::DashMap;

/// A result backend over a concurrent in-process map.
///
/// DashMap shards its buckets, so readers polling for terminal states do
/// not contend with the worker's writes. Single-process only: the records
/// are not shared across hosts.
pub struct InMemoryBackend {
    states: DashMap<String, TaskState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn set_state(&self, state: &TaskState) -> Result<()> {
        self.states
            .insert(state.task_uuid.clone(), state.clone());
        Ok(())
    }

    async fn get_state(&self, task_uuid: &str) -> Result<TaskState> {
        Ok(self
            .states
            .get(task_uuid)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| TaskState::pending(task_uuid)))
    }

    async fn purge_state(&self, task_uuid: &str) -> Result<()> {
        self.states.remove(task_uuid);
        Ok(())
    }
}
