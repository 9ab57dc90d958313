//! The no-op result backend.

use super::error::Result;
use super::Backend;
use crate::core::TaskState;
use async_trait::async_trait;

/// A backend that discards writes and always reports PENDING.
///
/// Configured when `result_backend` is empty. Worker behavior is unchanged;
/// async handles over this backend never observe a terminal state, so
/// callers are expected not to await them.
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for NullBackend {
    async fn set_state(&self, _state: &TaskState) -> Result<()> {
        Ok(())
    }

    async fn get_state(&self, task_uuid: &str) -> Result<TaskState> {
        Ok(TaskState::pending(task_uuid))
    }

    async fn purge_state(&self, _task_uuid: &str) -> Result<()> {
        Ok(())
    }
}
