//! Task operations on top of the dispatcher.
//!
//! SYSTEM CONTEXT
//! ==============
//! Each operation is one fixed method/path pair from the backend contract.
//! The backend scopes tasks to the credential's owner, so no user id is
//! sent. Callers are expected to have passed the task-view route guard.
//!
//! Input is validated and normalized here; a rejected request never reaches
//! the dispatcher.

#[cfg(test)]
#[path = "tasks_test.rs"]
mod tasks_test;

use reqwest::Method;

use super::dispatch::{ApiError, Dispatcher};
use super::types::{CreateTaskRequest, Task, TaskId, UpdateTaskRequest};

pub const MAX_TITLE_CHARS: usize = 255;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

const TASKS_PATH: &str = "/api/tasks";

fn task_path(id: TaskId) -> String {
    format!("{TASKS_PATH}/{id}")
}

fn toggle_path(id: TaskId) -> String {
    format!("{TASKS_PATH}/{id}/complete")
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Trim and check a task title.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] if the title is blank or too long.
pub fn validate_title(raw: &str) -> Result<String, ApiError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("Please enter a task title".to_owned()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::Validation(format!("Title cannot exceed {MAX_TITLE_CHARS} characters")));
    }
    Ok(title.to_owned())
}

fn normalize_description(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(description) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::Validation(format!(
            "Description cannot exceed {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(Some(description.to_owned()))
}

fn normalize_due_date(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|d| !d.is_empty()).map(str::to_owned)
}

impl CreateTaskRequest {
    /// Normalized copy ready to send.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for a blank/oversized title or an
    /// oversized description.
    pub fn validated(&self) -> Result<Self, ApiError> {
        Ok(Self {
            title: validate_title(&self.title)?,
            description: normalize_description(self.description.as_deref())?,
            due_date: normalize_due_date(self.due_date.as_deref()),
        })
    }
}

impl UpdateTaskRequest {
    /// Normalized copy ready to send. Absent fields stay absent.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] if a present title is blank or
    /// oversized, or a present description is oversized.
    pub fn validated(&self) -> Result<Self, ApiError> {
        Ok(Self {
            title: self.title.as_deref().map(validate_title).transpose()?,
            description: normalize_description(self.description.as_deref())?,
            due_date: normalize_due_date(self.due_date.as_deref()),
        })
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl Dispatcher {
    /// `GET /api/tasks`
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] from the dispatcher.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.get(TASKS_PATH).await
    }

    /// `GET /api/tasks/{id}`
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] from the dispatcher.
    pub async fn get_task(&self, id: TaskId) -> Result<Task, ApiError> {
        self.get(&task_path(id)).await
    }

    /// `POST /api/tasks`
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] before dispatch, otherwise any dispatcher error.
    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, ApiError> {
        let request = request.validated()?;
        self.send_json(Method::POST, TASKS_PATH, &request).await
    }

    /// `PUT /api/tasks/{id}` with only the fields present in `request`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] before dispatch, otherwise any dispatcher error.
    pub async fn update_task(&self, id: TaskId, request: &UpdateTaskRequest) -> Result<Task, ApiError> {
        let request = request.validated()?;
        self.send_json(Method::PUT, &task_path(id), &request).await
    }

    /// `DELETE /api/tasks/{id}`
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] from the dispatcher.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.delete(&task_path(id)).await
    }

    /// `PATCH /api/tasks/{id}/complete`; returns the task with its new state.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] from the dispatcher.
    pub async fn toggle_task(&self, id: TaskId) -> Result<Task, ApiError> {
        self.send_empty(Method::PATCH, &toggle_path(id)).await
    }
}
