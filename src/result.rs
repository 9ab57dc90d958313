//! Future-like handles over the result backend.
//!
//! An [`AsyncResult`] wraps a single task UUID; a [`ChainAsyncResult`]
//! wraps the ordered UUID list of a chain. Both poll the backend until the
//! task(s) reach a terminal state. Over a null backend nothing ever turns
//! terminal — callers configured without a result backend should not await.

use crate::backend::{Backend, BackendError};
use crate::core::{State, TaskResult, TaskState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How often `get` re-reads the backend while waiting for a terminal state.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Why waiting on a handle ended without a result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WaitError {
    /// The backend could not be read.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The task reached FAILURE; the message is the recorded failure
    /// string.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// The task reached SUCCESS but its record carries no result.
    #[error("task {0} reached SUCCESS without a result")]
    MissingResult(String),

    /// The chain handle holds no task UUIDs.
    #[error("chain contains no tasks")]
    EmptyChain,
}

/// A handle on a single published task.
#[derive(Clone)]
pub struct AsyncResult {
    task_uuid: String,
    backend: Arc<dyn Backend>,
}

impl AsyncResult {
    pub fn new(task_uuid: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            task_uuid: task_uuid.into(),
            backend,
        }
    }

    pub fn task_uuid(&self) -> &str {
        &self.task_uuid
    }

    /// One backend read; PENDING when no record exists yet.
    pub async fn get_state(&self) -> Result<TaskState, BackendError> {
        self.backend.get_state(&self.task_uuid).await
    }

    /// Blocks until the task reaches a terminal state, polling every
    /// 250 ms.
    pub async fn get(&self) -> Result<TaskResult, WaitError> {
        self.get_with_interval(DEFAULT_POLL_INTERVAL).await
    }

    /// Blocks until the task reaches a terminal state, polling at the
    /// given cadence.
    pub async fn get_with_interval(
        &self,
        interval: Duration,
    ) -> Result<TaskResult, WaitError> {
        loop {
            let state = self.get_state().await?;
            match state.state {
                State::Success => {
                    return state
                        .result
                        .ok_or_else(|| WaitError::MissingResult(self.task_uuid.clone()))
                }
                State::Failure => {
                    return Err(WaitError::TaskFailed(
                        state
                            .error
                            .unwrap_or_else(|| "unknown failure".to_string()),
                    ))
                }
                _ => tokio::time::sleep(interval).await,
            }
        }
    }

    pub async fn is_completed(&self) -> Result<bool, BackendError> {
        Ok(self.get_state().await?.is_completed())
    }

    pub async fn is_success(&self) -> Result<bool, BackendError> {
        Ok(self.get_state().await?.is_success())
    }

    pub async fn is_failure(&self) -> Result<bool, BackendError> {
        Ok(self.get_state().await?.is_failure())
    }
}

/// A handle on a whole chain, captured at compose time.
#[derive(Clone)]
pub struct ChainAsyncResult {
    task_uuids: Vec<String>,
    backend: Arc<dyn Backend>,
}

impl ChainAsyncResult {
    pub fn new(task_uuids: Vec<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            task_uuids,
            backend,
        }
    }

    pub fn task_uuids(&self) -> &[String] {
        &self.task_uuids
    }

    /// Blocks on each link in order; any FAILURE short-circuits, full
    /// success returns the last link's result.
    pub async fn get(&self) -> Result<TaskResult, WaitError> {
        self.get_with_interval(DEFAULT_POLL_INTERVAL).await
    }

    pub async fn get_with_interval(
        &self,
        interval: Duration,
    ) -> Result<TaskResult, WaitError> {
        let mut last = None;
        for task_uuid in &self.task_uuids {
            let handle = AsyncResult::new(task_uuid.clone(), self.backend.clone());
            last = Some(handle.get_with_interval(interval).await?);
        }
        last.ok_or(WaitError::EmptyChain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::core::{ArgValue, TaskState};

    fn interval() -> Duration {
        Duration::from_millis(5)
    }

    #[tokio::test]
    async fn test_get_waits_for_terminal_state() {
        let backend = Arc::new(InMemoryBackend::new());
        let handle = AsyncResult::new("abc", backend.clone());

        let writer = {
            let backend = backend.clone();
            tokio::spawn(async move {
                backend.set_state(&TaskState::received("abc")).await.unwrap();
                backend.set_state(&TaskState::started("abc")).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                backend
                    .set_state(&TaskState::success(
                        "abc",
                        TaskResult::from_value(ArgValue::Int64(5)),
                    ))
                    .await
                    .unwrap();
            })
        };

        let result = handle.get_with_interval(interval()).await.unwrap();
        writer.await.unwrap();
        assert_eq!(result.type_name, "int64");
        assert_eq!(result.value, serde_json::json!(5));
        assert!(handle.is_success().await.unwrap());
        assert!(handle.is_completed().await.unwrap());
    }

    #[tokio::test]
    async fn test_get_carries_failure_string() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .set_state(&TaskState::failure("abc", "boom"))
            .await
            .unwrap();

        let handle = AsyncResult::new("abc", backend);
        let err = handle.get_with_interval(interval()).await.unwrap_err();
        assert!(matches!(err, WaitError::TaskFailed(ref msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn test_predicates_on_pending_task() {
        let backend = Arc::new(InMemoryBackend::new());
        let handle = AsyncResult::new("missing", backend);
        assert!(!handle.is_completed().await.unwrap());
        assert!(!handle.is_success().await.unwrap());
        assert!(!handle.is_failure().await.unwrap());
    }

    #[tokio::test]
    async fn test_chain_returns_last_result() {
        let backend = Arc::new(InMemoryBackend::new());
        for (uuid, value) in [("s0", 2), ("s1", 13), ("s2", 52)] {
            backend
                .set_state(&TaskState::success(
                    uuid,
                    TaskResult::from_value(ArgValue::Int64(value)),
                ))
                .await
                .unwrap();
        }

        let handle = ChainAsyncResult::new(
            vec!["s0".to_string(), "s1".to_string(), "s2".to_string()],
            backend,
        );
        let result = handle.get_with_interval(interval()).await.unwrap();
        assert_eq!(result.value, serde_json::json!(52));
    }

    #[tokio::test]
    async fn test_chain_short_circuits_on_failure() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .set_state(&TaskState::success(
                "s0",
                TaskResult::from_value(ArgValue::Int64(2)),
            ))
            .await
            .unwrap();
        backend
            .set_state(&TaskState::failure("s1", "midway"))
            .await
            .unwrap();
        // s2 never runs; its record stays PENDING, which would block
        // forever if the chain did not short-circuit at s1.

        let handle = ChainAsyncResult::new(
            vec!["s0".to_string(), "s1".to_string(), "s2".to_string()],
            backend,
        );
        let err = handle.get_with_interval(interval()).await.unwrap_err();
        assert!(matches!(err, WaitError::TaskFailed(ref msg) if msg == "midway"));
    }
}
