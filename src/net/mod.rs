//! Networking modules for the task backend's REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `dispatch` owns every outbound request and its error classification,
//! `tasks` and `auth` are typed operations on top of it, and `types` defines
//! the shared wire schema.

pub mod auth;
pub mod dispatch;
pub mod tasks;
pub mod types;

pub use dispatch::{ApiError, Dispatcher, SessionHooks, SessionSnapshot};
