//! Core types for the ergates task queue.
//!
//! # Domain model
//! - [`TaskSignature`]: the on-wire record of a task invocation, including
//!   its success and error continuations
//! - [`TaskArg`] / [`TaskResult`]: tagged argument and return values
//! - [`TaskState`] / [`State`]: the lifecycle record persisted by result
//!   backends
//!
//! # Coercion
//! - [`ArgKind`] / [`ArgValue`]: the supported type tags and their concrete
//!   values
//! - [`coerce`]: narrow a wire argument to an expected parameter kind
//!
//! # Error handling
//! - [`CoreError`]: coercion and parse failures, with a [`Result`] alias

mod coercion;
mod error;
mod signature;
mod state;

pub use coercion::{coerce, ArgKind, ArgValue};
pub use error::{CoreError, Result};
pub use signature::{TaskArg, TaskResult, TaskSignature};
pub use state::{State, TaskState};
