//! Result backends: durable stores for task state records.
//!
//! A [`Backend`] persists [`TaskState`] records keyed by task UUID and
//! serves the polling reads behind the async handles. Reference stores:
//!
//! - [`AmqpBackend`] — one broker queue per task UUID with a message TTL.
//!   Simple, but pathological past a few thousand concurrent tasks.
//! - [`MemcacheBackend`] — UUID-keyed records with expiry; the production
//!   choice.
//! - [`InMemoryBackend`] — single-process store for tests and embedded use.
//! - [`NullBackend`] — discards writes and always reports PENDING, for
//!   deployments that never await results.
//!
//! A missing record reads as PENDING: the state machine's implicit default.

mod amqp;
mod error;
mod memcache;
mod memory;
mod null;

pub use amqp::AmqpBackend;
pub use error::{BackendError, Result};
pub use memcache::MemcacheBackend;
pub use memory::InMemoryBackend;
pub use null::NullBackend;

use crate::core::TaskState;
use async_trait::async_trait;

/// A common interface for all result backends.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Persists a state record for the record's task UUID.
    async fn set_state(&self, state: &TaskState) -> Result<()>;

    /// Reads the freshest state record for a task UUID. Returns a PENDING
    /// record when the backend holds nothing for the UUID.
    async fn get_state(&self, task_uuid: &str) -> Result<TaskState>;

    /// Drops whatever the backend holds for a task UUID.
    async fn purge_state(&self, task_uuid: &str) -> Result<()>;
}
