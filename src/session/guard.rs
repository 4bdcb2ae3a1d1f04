//! Route guard decisions.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every route applies the same rule set: the task view requires a session,
//! the login/register entry points bounce authenticated users to the task
//! view, and nothing is decided until the session's readiness is known.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use super::manager::{Readiness, SessionState};
use super::navigation::Route;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Readiness is still undetermined; show a neutral loading state.
    Pending,
    Render,
    Redirect(Route),
}

#[must_use]
pub fn guard_route(route: Route, state: &SessionState) -> GuardDecision {
    if state.readiness() == Readiness::Undetermined {
        return GuardDecision::Pending;
    }
    match (route, state.is_authenticated()) {
        (Route::Tasks, false) => GuardDecision::Redirect(Route::Login),
        (Route::Login | Route::Register, true) => GuardDecision::Redirect(Route::Tasks),
        _ => GuardDecision::Render,
    }
}
