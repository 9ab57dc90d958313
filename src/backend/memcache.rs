//! Memcache result backend.
//!
//! Key = task UUID, value = serialized state record, expiry =
//! `results_expire_in`. The memcache client is blocking, so every call runs
//! behind `spawn_blocking` to keep the async runtime unblocked.

use super::error::{BackendError, Result};
use super::Backend;
use crate::core::TaskState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// URL scheme prefix for memcache backend configuration.
const URL_PREFIX: &str = "memcache://";

/// Splits a `memcache://h1:p,h2:p` backend URL into per-server connection
/// URLs.
pub(crate) fn parse_server_list(url: &str) -> Result<Vec<String>> {
    let hosts = url
        .strip_prefix(URL_PREFIX)
        .ok_or_else(|| BackendError::UnsupportedUrl(url.to_string()))?;
    let servers: Vec<String> = hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(|host| format!("{URL_PREFIX}{host}"))
        .collect();
    if servers.is_empty() {
        return Err(BackendError::UnsupportedUrl(url.to_string()));
    }
    Ok(servers)
}

/// A result backend over a memcache cluster.
pub struct MemcacheBackend {
    client: Arc<memcache::Client>,
    expires_in: u32,
}

impl MemcacheBackend {
    /// Connects to the servers named in a `memcache://h1:p,h2:p` URL.
    pub fn from_url(url: &str, expires_in: u64) -> Result<Self> {
        Self::new(parse_server_list(url)?, expires_in)
    }

    /// Connects to the given per-server connection URLs.
    pub fn new(servers: Vec<String>, expires_in: u64) -> Result<Self> {
        let client = memcache::Client::connect(servers)
            .map_err(|e| BackendError::Store(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            expires_in: expires_in.min(u32::MAX as u64) as u32,
        })
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<memcache::Client>) -> std::result::Result<T, memcache::MemcacheError>
            + Send
            + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || op(client))
            .await
            .map_err(|e| BackendError::Store(e.to_string()))?
            .map_err(|e| BackendError::Store(e.to_string()))
    }
}

#[async_trait]
impl Backend for MemcacheBackend {
    async fn set_state(&self, state: &TaskState) -> Result<()> {
        let key = state.task_uuid.clone();
        let payload = serde_json::to_string(state)?;
        let expires_in = self.expires_in;
        debug!("storing state {} for task {}", state.state, key);
        self.run_blocking(move |client| client.set(&key, payload.as_str(), expires_in))
            .await
    }

    async fn get_state(&self, task_uuid: &str) -> Result<TaskState> {
        let key = task_uuid.to_string();
        let payload: Option<String> = self
            .run_blocking(move |client| client.get::<String>(&key))
            .await?;
        match payload {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Ok(TaskState::pending(task_uuid)),
        }
    }

    async fn purge_state(&self, task_uuid: &str) -> Result<()> {
        let key = task_uuid.to_string();
        self.run_blocking(move |client| client.delete(&key).map(|_| ()))
            .await
    }
}
