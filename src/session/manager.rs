//! Session manager: the single owner of the in-memory credential.
//!
//! DESIGN
//! ======
//! State lives behind one mutex and changes only through `login`, `logout`
//! and the one-time `mount`. The dispatcher never sees the state directly;
//! `mount` hands it an accessor and a deregistration callback, both reading
//! the live state at call time.
//!
//! Every credential change bumps `generation`. The dispatcher passes back the
//! generation a request was sent under, so a 401 for a request issued before
//! a newer login cannot tear that newer session down.
//!
//! The credential is never persisted; a new process always starts signed out.

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::claims::{IdentityClaims, decode_claims};
use super::guard::{GuardDecision, guard_route};
use super::navigation::{Navigator, Route};
use crate::net::{Dispatcher, SessionHooks, SessionSnapshot};

// =============================================================================
// STATE
// =============================================================================

/// Opaque bearer token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Readiness {
    #[default]
    Undetermined,
    Determined,
}

/// Credential together with the claims decoded from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authenticated {
    pub credential: Credential,
    pub claims: IdentityClaims,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    readiness: Readiness,
    auth: Option<Authenticated>,
    generation: u64,
}

impl SessionState {
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.auth.as_ref().map(|a| &a.credential)
    }

    #[must_use]
    pub fn claims(&self) -> Option<&IdentityClaims> {
        self.auth.as_ref().map(|a| &a.claims)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn snapshot_for_dispatch(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.credential().map(|c| c.as_str().to_owned()),
            generation: self.generation,
        }
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Owns authentication state for the lifetime of the process.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<Mutex<SessionState>>,
    navigator: Arc<dyn Navigator>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").field("state", &*self.lock()).finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { state: Arc::new(Mutex::new(SessionState::default())), navigator }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.lock().readiness
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated()
    }

    #[must_use]
    pub fn claims(&self) -> Option<IdentityClaims> {
        self.lock().claims().cloned()
    }

    /// Adopt a credential the backend just issued.
    ///
    /// Surrounding whitespace is dropped; the stored credential is exactly
    /// the text the claims were decoded from. If it does not decode to a
    /// subject id the call changes nothing. Returns whether the credential
    /// was adopted.
    pub fn login(&self, raw: &str) -> bool {
        let raw = raw.trim();
        let claims = match decode_claims(raw) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring login with undecodable credential");
                return false;
            }
        };

        let mut state = self.lock();
        state.generation += 1;
        tracing::info!(user_id = claims.user_id, generation = state.generation, "session authenticated");
        state.auth = Some(Authenticated { credential: Credential::new(raw), claims });
        true
    }

    /// Drop the credential and send the user to the login entry point.
    pub fn logout(&self) {
        self.end_session(None);
    }

    /// End the session, unless `expected_generation` is given and the
    /// session has moved on since. Returns whether the session was ended.
    fn end_session(&self, expected_generation: Option<u64>) -> bool {
        {
            let mut state = self.lock();
            if let Some(expected) = expected_generation {
                if expected != state.generation {
                    tracing::debug!(
                        expected,
                        current = state.generation,
                        "ignoring unauthorized response from an older session"
                    );
                    return false;
                }
            }
            if state.auth.take().is_some() {
                state.generation += 1;
                tracing::info!(generation = state.generation, "session ended");
            }
        }
        self.navigator.navigate(Route::Login);
        true
    }

    /// One-time mount: wire the dispatcher to this session, then mark
    /// readiness as determined. Later calls do nothing and return `false`.
    pub fn mount(&self, dispatcher: &Dispatcher) -> bool {
        let mut state = self.lock();
        if state.readiness == Readiness::Determined {
            return false;
        }

        let reader = Arc::clone(&self.state);
        let owner = self.clone();
        dispatcher.register_session(SessionHooks::new(
            move || reader.lock().unwrap_or_else(PoisonError::into_inner).snapshot_for_dispatch(),
            move |generation| {
                owner.end_session(Some(generation));
            },
        ));

        state.readiness = Readiness::Determined;
        tracing::debug!(authenticated = state.is_authenticated(), "session ready");
        true
    }

    /// Evaluate the route guard for `route` and perform any redirect.
    pub fn visit(&self, route: Route) -> GuardDecision {
        let decision = guard_route(route, &self.snapshot());
        if let GuardDecision::Redirect(target) = decision {
            self.navigator.navigate(target);
        }
        decision
    }
}
