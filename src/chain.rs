//! Chain composer: links signatures into a sequential workflow.
//!
//! A chain threads each task's result into the next task's argument list
//! (unless a link is immutable). Only the head is published up front; the
//! worker publishes each subsequent link as its predecessor succeeds. The
//! UUID list is captured at compose time, so result lookup never depends on
//! the broker delivering every link.

use crate::core::TaskSignature;

/// An ordered sequence of tasks, each installed as its predecessor's sole
/// success continuation.
#[derive(Debug, Clone)]
pub struct Chain {
    head: TaskSignature,
    task_uuids: Vec<String>,
}

impl Chain {
    /// Composes a chain from an ordered task list.
    ///
    /// Assigns a UUID to every link and overwrites each link's
    /// `on_success` with its successor, so every link except the tail has
    /// exactly one success continuation. Returns `None` for an empty list.
    pub fn new(mut tasks: Vec<TaskSignature>) -> Option<Self> {
        let task_uuids: Vec<String> = tasks
            .iter_mut()
            .map(|task| task.ensure_uuid().to_string())
            .collect();

        let mut links = tasks.into_iter().rev();
        let mut head = links.next()?;
        head.on_success = Vec::new();
        for mut link in links {
            link.on_success = vec![head];
            head = link;
        }

        Some(Self { head, task_uuids })
    }

    /// The fully-linked head signature; publishing it starts the chain.
    pub fn head(&self) -> &TaskSignature {
        &self.head
    }

    /// The chain's task UUIDs in execution order, captured at compose time.
    pub fn task_uuids(&self) -> &[String] {
        &self.task_uuids
    }

    pub(crate) fn into_parts(self) -> (TaskSignature, Vec<String>) {
        (self.head, self.task_uuids)
    }
}
