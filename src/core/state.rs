//! Task state records persisted by result backends.

use super::error::CoreError;
use super::signature::TaskResult;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// A record for a given UUID only progresses forward through this order;
/// writing a backward transition is a programmer error. `Pending` is the
/// implicit default when no record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Pending,
    Received,
    Started,
    Success,
    Failure,
}

impl State {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Pending => "PENDING",
            State::Received => "RECEIVED",
            State::Started => "STARTED",
            State::Success => "SUCCESS",
            State::Failure => "FAILURE",
        }
    }

    /// Returns true for `Success` and `Failure`; all other states are
    /// transient.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Success | State::Failure)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(State::Pending),
            "RECEIVED" => Ok(State::Received),
            "STARTED" => Ok(State::Started),
            "SUCCESS" => Ok(State::Success),
            "FAILURE" => Ok(State::Failure),
            _ => Err(CoreError::InvalidState(s.to_string())),
        }
    }
}

/// A task state record keyed by the task UUID.
///
/// `result` is present only on SUCCESS records; `error` carries the failure
/// string on FAILURE records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_uuid: String,
    pub state: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskState {
    /// The implicit record returned when a backend holds nothing for a UUID.
    pub fn pending(task_uuid: impl Into<String>) -> Self {
        Self {
            task_uuid: task_uuid.into(),
            state: State::Pending,
            result: None,
            error: None,
        }
    }

    pub fn received(task_uuid: impl Into<String>) -> Self {
        Self {
            task_uuid: task_uuid.into(),
            state: State::Received,
            result: None,
            error: None,
        }
    }

    pub fn started(task_uuid: impl Into<String>) -> Self {
        Self {
            task_uuid: task_uuid.into(),
            state: State::Started,
            result: None,
            error: None,
        }
    }

    pub fn success(task_uuid: impl Into<String>, result: TaskResult) -> Self {
        Self {
            task_uuid: task_uuid.into(),
            state: State::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(task_uuid: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_uuid: task_uuid.into(),
            state: State::Failure,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Returns true once the task has reached SUCCESS or FAILURE.
    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.state == State::Success
    }

    pub fn is_failure(&self) -> bool {
        self.state == State::Failure
    }
}
