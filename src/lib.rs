//! Ergates: Distributed Task Queue for Rust
//!
//! `ergates` (ἐργάτης, Greek for "worker" — also the capstan that hauls a
//! load in) is an asynchronous distributed task queue. Producers publish
//! task invocations to a message broker; worker processes, possibly on many
//! hosts, pull them off, invoke the registered function with type-coerced
//! arguments, persist the outcome to a result backend, and fan out
//! continuation tasks. Callers hold future-like handles that block until a
//! task — or a whole chain — reaches a terminal state.
//!
//! # Features
//!
//! - **Pluggable transport**: AMQP is the reference broker; an in-process
//!   broker covers single-process deployments and tests
//! - **Typed dispatch**: task functions are plain async functions over the
//!   primitive types; wire arguments are coerced against their parameter
//!   lists, with variadic tails supported
//! - **Continuations and chains**: success/error fan-out on every task,
//!   plus a composer that threads each result into the next task's
//!   arguments
//! - **Pluggable result backends**: AMQP, memcache, in-memory, or none
//! - **At-least-once delivery**: explicit acks with a bounded prefetch
//!   window; task bodies are expected to be idempotent
//!
//! # Quick Start
//!
//! ```ignore
//! use ergates::prelude::*;
//!
//! async fn add(a: i64, b: i64) -> Result<i64, BoxError> {
//!     Ok(a + b)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(Config::default())?;
//!     server.register_task("add", add).await;
//!
//!     // Worker side (typically its own process):
//!     let worker = server.new_worker("worker-1");
//!     tokio::spawn(async move { worker.launch().await });
//!
//!     // Producer side:
//!     let handle = server
//!         .send_task(TaskSignature::new("add").arg(2i64).arg(3i64))
//!         .await?;
//!     let result = handle.get().await?;
//!     println!("2 + 3 = {}", result.value);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! Each module hides a design decision likely to change independently:
//!
//! - [`core`]: wire types, task states, argument coercion
//! - [`broker`]: delivery transports (hides the wire protocol)
//! - [`backend`]: result stores (hides the persistence choice)
//! - [`registry`]: typed task registration (hides the dispatch mechanism)
//! - [`worker`]: the processing pipeline
//! - [`server`], [`chain`], [`result`]: the producer-facing surface

pub mod backend;
pub mod broker;
pub mod chain;
pub mod config;
pub mod core;
pub mod registry;
pub mod result;
pub mod server;
pub mod worker;

// Re-export commonly used types for convenience
pub use crate::core::{
    coerce, ArgKind, ArgValue, CoreError, State, TaskArg, TaskResult, TaskSignature,
    TaskState,
};

pub use backend::{
    AmqpBackend, Backend, BackendError, InMemoryBackend, MemcacheBackend, NullBackend,
};
pub use broker::{AmqpBroker, Broker, BrokerError, InMemoryBroker, TaskProcessor};
pub use chain::Chain;
pub use config::Config;
pub use registry::{ArgType, BoxError, IntoTaskFn, Registry, TaskError, Variadic};
pub use result::{AsyncResult, ChainAsyncResult, WaitError};
pub use server::{Server, ServerError};
pub use worker::Worker;

// Re-export dependencies that appear in the public API, so downstream
// crates cannot hit version mismatches on them.
pub use serde;
pub use serde_json;
pub use tokio;
pub use uuid;

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```ignore
/// use ergates::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::Backend;
    pub use crate::broker::Broker;
    pub use crate::chain::Chain;
    pub use crate::config::Config;
    pub use crate::core::{TaskArg, TaskResult, TaskSignature};
    pub use crate::registry::{BoxError, Variadic};
    pub use crate::result::{AsyncResult, ChainAsyncResult};
    pub use crate::server::Server;
    pub use crate::worker::Worker;

    pub use std::sync::Arc;
}
