//! # taskdeck
//!
//! Client core for the task-management REST backend: an in-memory session
//! manager, the authenticated request dispatcher every backend call goes
//! through, and the typed task/auth operations built on top of it.
//!
//! The `taskdeck` binary in `main.rs` is a thin command-line front end that
//! drives this library the same way a page would.

pub mod config;
pub mod net;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
