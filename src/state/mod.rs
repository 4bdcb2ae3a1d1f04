//! View-side state kept by callers of the task API.

pub mod tasks;
