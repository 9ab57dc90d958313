//! Worker: consumes deliveries, dispatches registered tasks, records
//! states, and fans out continuations.
//!
//! The processing pipeline for one delivery:
//!
//! 1. record RECEIVED;
//! 2. look up the task by name — unknown names fail the task;
//! 3. coerce the wire arguments against the task's parameter types — a
//!    coercion failure records FAILURE directly, so STARTED is never
//!    written for a task that could not begin;
//! 4. record STARTED and invoke;
//! 5. on success, record SUCCESS with the result and publish each
//!    `on_success` continuation, prepending the result to its arguments
//!    unless the signature is immutable;
//! 6. on any failure, record FAILURE with the error string and publish each
//!    `on_error` continuation with the error string prepended.
//!
//! Readers of the backend therefore observe a single task's states in the
//! order RECEIVED → STARTED → (SUCCESS | FAILURE), with STARTED present
//! only when the task function actually ran.
//!
//! A task function returns a single value; where the original invocation
//! had more, only the first non-error value is representable, and that is
//! what the state record carries. Backend write failures are logged and
//! processing continues — continuation fan-out never rolls back a terminal
//! state, and a delivery is never failed by the worker itself.

use crate::backend::Backend;
use crate::broker::{Broker, BrokerError, TaskProcessor};
use crate::core::{TaskArg, TaskResult, TaskSignature, TaskState};
use crate::registry::{Registry, TaskError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Delay between consume attempts after a retryable transport fault.
const CONSUME_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A worker process: one consume loop feeding the dispatch pipeline.
///
/// Cloning is cheap (the collaborators are shared); a clone of the worker
/// is handed to the broker as the delivery processor.
#[derive(Clone)]
pub struct Worker {
    consumer_tag: String,
    broker: Arc<dyn Broker>,
    backend: Arc<dyn Backend>,
    registry: Arc<RwLock<Registry>>,
}

impl Worker {
    pub fn new(
        consumer_tag: impl Into<String>,
        broker: Arc<dyn Broker>,
        backend: Arc<dyn Backend>,
        registry: Arc<RwLock<Registry>>,
    ) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            broker,
            backend,
            registry,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Runs the consume loop until stopped or a non-retryable fault occurs.
    ///
    /// Transport faults are retried after a short delay; protocol faults
    /// propagate to the caller.
    pub async fn launch(&self) -> Result<(), BrokerError> {
        info!("worker {} launching", self.consumer_tag);
        loop {
            let processor: Arc<dyn TaskProcessor> = Arc::new(self.clone());
            match self
                .broker
                .start_consuming(&self.consumer_tag, processor)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "worker {} consume failed, retrying: {}",
                        self.consumer_tag, e
                    );
                    tokio::time::sleep(CONSUME_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Requests the consume loop to stop; the in-flight task (if any)
    /// finishes first.
    pub fn stop(&self) {
        self.broker.stop_consuming();
    }

    /// Best-effort state write: an unavailable backend must not stall task
    /// processing or continuation fan-out.
    async fn record_state(&self, state: TaskState) {
        if let Err(e) = self.backend.set_state(&state).await {
            warn!(
                "failed to record state {} for task {}: {}",
                state.state, state.task_uuid, e
            );
        }
    }

    async fn publish_continuation(&self, mut continuation: TaskSignature) {
        if let Err(e) = self.broker.publish(&mut continuation).await {
            // The predecessor's terminal state stands; the continuation's
            // own record stays PENDING until an operator re-drives it.
            error!(
                "failed to publish continuation {}: {}",
                continuation.name, e
            );
        }
    }

    async fn finalize_success(&self, signature: &TaskSignature, result: TaskResult) {
        self.record_state(TaskState::success(signature.uuid.as_str(), result.clone()))
            .await;
        info!("task {} ({}) succeeded", signature.uuid, signature.name);

        for continuation in &signature.on_success {
            let mut continuation = continuation.clone();
            if !signature.immutable {
                continuation.args.insert(0, result.to_arg());
            }
            self.publish_continuation(continuation).await;
        }
    }

    async fn finalize_failure(&self, signature: &TaskSignature, err: TaskError) {
        let message = err.to_string();
        self.record_state(TaskState::failure(signature.uuid.as_str(), message.clone()))
            .await;
        warn!(
            "task {} ({}) failed: {}",
            signature.uuid, signature.name, message
        );

        for continuation in &signature.on_error {
            let mut continuation = continuation.clone();
            continuation
                .args
                .insert(0, TaskArg::typed(message.clone()));
            self.publish_continuation(continuation).await;
        }
    }
}

#[async_trait]
impl TaskProcessor for Worker {
    async fn process(&self, signature: TaskSignature) {
        self.record_state(TaskState::received(signature.uuid.as_str()))
            .await;

        // Brief read guard; the Arc'd adapter is cloned out so no lock is
        // held across the invocation.
        let task = { self.registry.read().await.get(&signature.name) };
        let Some(task) = task else {
            self.finalize_failure(
                &signature,
                TaskError::NotRegistered(signature.name.clone()),
            )
            .await;
            return;
        };

        // Coercion happens before STARTED: a task whose arguments do not
        // fit never began.
        let invocation = match task(signature.args.clone()) {
            Ok(invocation) => invocation,
            Err(e) => {
                self.finalize_failure(&signature, e).await;
                return;
            }
        };

        self.record_state(TaskState::started(signature.uuid.as_str()))
            .await;

        match invocation.await {
            Ok(value) => {
                self.finalize_success(&signature, TaskResult::from_value(value))
                    .await
            }
            Err(e) => self.finalize_failure(&signature, e).await,
        }
    }
}
