//! Wire DTOs for the client/backend boundary.
//!
//! DESIGN
//! ======
//! These types mirror the backend's JSON payloads. Timestamps stay as the
//! backend's ISO-8601 text; the client never does date arithmetic on them.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type UserId = i64;

pub const UNKNOWN_ERROR_CODE: &str = "unknown_error";
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unexpected error occurred";
pub const REQUEST_FAILED_MESSAGE: &str = "Request failed";

// =============================================================================
// TASKS
// =============================================================================

/// A todo item owned by the authenticated user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Owner; always the user the credential was issued to.
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Body of `POST /api/tasks`. Build through [`CreateTaskRequest::new`] and
/// let the task operations validate it before dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl CreateTaskRequest {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), description: None, due_date: None }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }
}

/// Body of `PUT /api/tasks/{id}`. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl UpdateTaskRequest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.due_date.is_none()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Structured error body the backend sends with non-2xx responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default = "unknown_error_code")]
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Fallback used when an error response body is not parseable.
    #[must_use]
    pub fn unknown() -> Self {
        Self { error: UNKNOWN_ERROR_CODE.to_owned(), message: Some(UNKNOWN_ERROR_MESSAGE.to_owned()) }
    }

    /// Parse an error body, falling back to [`ApiErrorBody::unknown`].
    #[must_use]
    pub fn parse_or_unknown(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self::unknown())
    }

    /// Message to surface to the user; never empty.
    #[must_use]
    pub fn display_message(&self) -> &str {
        match self.message.as_deref() {
            Some(message) if !message.trim().is_empty() => message,
            _ => REQUEST_FAILED_MESSAGE,
        }
    }
}

fn unknown_error_code() -> String {
    UNKNOWN_ERROR_CODE.to_owned()
}

// =============================================================================
// AUTH
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Credential issued by `POST /auth/login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Account record returned by `/auth/register` and `/auth/me`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
