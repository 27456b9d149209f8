//! Authoritative in-memory map of task id to task record.
//!
//! One mutex guards the whole map, so a reader never sees a state without its
//! matching result or error. Records live for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::WorkerError;
use crate::task::model::{ConversionOutput, Task, TaskState, TaskStatus};

#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: Mutex<HashMap<String, Task>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Task>> {
        // A panic while holding the lock cannot leave a half-written record:
        // every mutation below replaces `status` in a single assignment.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, task: Task) {
        self.lock().insert(task.id.clone(), task);
    }

    /// Rolls back an insert whose task never reached the queue.
    pub(crate) fn remove(&self, task_id: &str) -> Option<Task> {
        self.lock().remove(task_id)
    }

    /// Snapshot of a task record.
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.lock().get(task_id).cloned()
    }

    pub fn state(&self, task_id: &str) -> Option<TaskState> {
        self.lock().get(task_id).map(Task::state)
    }

    /// All tasks stamped with `batch_id`, oldest first.
    pub fn batch(&self, batch_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .lock()
            .values()
            .filter(|t| t.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    pub fn count_in_state(&self, state: TaskState) -> usize {
        self.lock().values().filter(|t| t.state() == state).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn mark_processing(&self, task_id: &str) -> Result<(), WorkerError> {
        self.transition(task_id, TaskStatus::Processing)
    }

    pub(crate) fn mark_completed(
        &self,
        task_id: &str,
        output: ConversionOutput,
    ) -> Result<(), WorkerError> {
        self.transition(task_id, TaskStatus::Completed(output))
    }

    pub(crate) fn mark_failed(&self, task_id: &str, error: String) -> Result<(), WorkerError> {
        self.transition(task_id, TaskStatus::Failed { error })
    }

    fn transition(&self, task_id: &str, next: TaskStatus) -> Result<(), WorkerError> {
        let mut tasks = self.lock();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkerError::UnknownTask(task_id.to_string()))?;

        let from = task.state();
        let to = next.state();
        if !from.can_transition_to(to) {
            return Err(WorkerError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to,
            });
        }

        task.status = next;
        Ok(())
    }
}
