//! Wire types for task invocations.
//!
//! A [`TaskSignature`] is the canonical on-wire record of a single task
//! invocation: the registered function name, tagged positional arguments,
//! a routing hint, and the continuation trees published on success or
//! failure. Signatures are encoded as JSON with these exact field names, so
//! producers in other languages interoperate directly.

use super::coercion::ArgValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single positional argument: a textual type tag plus whatever value the
/// serializer produced. Coercion narrows the value back to the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArg {
    pub type_name: String,
    pub value: Value,
}

impl TaskArg {
    pub fn new(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    /// Builds a tagged argument from a typed value; the tag is derived from
    /// the value's kind.
    pub fn typed<T: Into<ArgValue>>(value: T) -> Self {
        let value = value.into();
        Self {
            type_name: value.kind().tag().to_string(),
            value: value.into_json(),
        }
    }
}

/// A task's return value: the runtime type tag plus the encoded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub type_name: String,
    pub value: Value,
}

impl TaskResult {
    /// Builds a result from a typed return value.
    pub fn from_value(value: ArgValue) -> Self {
        Self {
            type_name: value.kind().tag().to_string(),
            value: value.into_json(),
        }
    }

    /// Converts the result into an argument with the same tag and value,
    /// for prepension onto a success continuation's argument list.
    pub fn to_arg(&self) -> TaskArg {
        TaskArg {
            type_name: self.type_name.clone(),
            value: self.value.clone(),
        }
    }
}

/// The canonical on-wire record of a task invocation.
///
/// `on_success` continuations are published by the worker after this task
/// succeeds; unless `immutable` is set, this task's result is prepended to
/// each continuation's arguments. `on_error` continuations are published on
/// failure with the failure message prepended as their first argument.
///
/// Continuations are arbitrary signature trees and nothing in the wire
/// format prevents cycles; composing an acyclic tree is the producer's
/// responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSignature {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub routing_key: String,
    #[serde(default)]
    pub args: Vec<TaskArg>,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default)]
    pub on_success: Vec<TaskSignature>,
    #[serde(default)]
    pub on_error: Vec<TaskSignature>,
}

impl TaskSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: String::new(),
            name: name.into(),
            routing_key: String::new(),
            args: Vec::new(),
            immutable: false,
            on_success: Vec::new(),
            on_error: Vec::new(),
        }
    }

    /// Appends a typed positional argument.
    pub fn arg<T: Into<ArgValue>>(mut self, value: T) -> Self {
        self.args.push(TaskArg::typed(value));
        self
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    /// Marks the task immutable: its result is not propagated into its
    /// success continuations' argument lists.
    pub fn immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    pub fn on_success(mut self, signature: TaskSignature) -> Self {
        self.on_success.push(signature);
        self
    }

    pub fn on_error(mut self, signature: TaskSignature) -> Self {
        self.on_error.push(signature);
        self
    }

    /// Assigns a fresh UUID iff none is set, and returns the UUID.
    pub fn ensure_uuid(&mut self) -> &str {
        if self.uuid.is_empty() {
            self.uuid = Uuid::new_v4().to_string();
        }
        &self.uuid
    }

    /// Fills in the routing key iff it is empty.
    ///
    /// Direct exchanges route by the binding key so deployments respect the
    /// queue binding; every other exchange type routes by the default queue
    /// name.
    pub fn adjust_routing_key(
        &mut self,
        exchange_type: &str,
        binding_key: &str,
        default_queue: &str,
    ) {
        if !self.routing_key.is_empty() {
            return;
        }
        if exchange_type == "direct" {
            self.routing_key = binding_key.to_string();
        } else {
            self.routing_key = default_queue.to_string();
        }
    }
}
