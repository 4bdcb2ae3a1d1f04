//! Task-list state for the task view.
//!
//! DESIGN
//! ======
//! Responses to concurrent operations arrive in any order, so every result
//! is merged by task id rather than by request sequence.

#[cfg(test)]
#[path = "tasks_test.rs"]
mod tasks_test;

use crate::net::ApiError;
use crate::net::types::{Task, TaskId};

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load tasks";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct TaskListState {
    pub tasks: Vec<Task>,
    pub load: LoadState,
    pub error: Option<String>,
}

impl TaskListState {
    pub fn begin_load(&mut self) {
        self.load = LoadState::Loading;
        self.error = None;
    }

    /// Apply the outcome of a list fetch. A failure keeps the previous tasks.
    pub fn apply_loaded(&mut self, result: Result<Vec<Task>, ApiError>) {
        match result {
            Ok(tasks) => {
                self.tasks = tasks;
                self.load = LoadState::Loaded;
                self.error = None;
            }
            Err(e) => {
                let message = e.to_string();
                self.error = Some(if message.is_empty() { LOAD_FAILED_MESSAGE.to_owned() } else { message });
                self.load = LoadState::Failed;
            }
        }
    }

    /// Replace the task with the same id, or append it if unknown.
    pub fn upsert(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    /// Drop a task by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tasks.len() - self.completed_count()
    }

    /// Nothing to show and nothing in flight.
    #[must_use]
    pub fn is_empty_view(&self) -> bool {
        self.load == LoadState::Loaded && self.tasks.is_empty()
    }
}
