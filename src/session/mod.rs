//! Client-side session lifecycle.
//!
//! DESIGN
//! ======
//! `manager` owns the only credential slot and its transitions, `claims`
//! decodes identity from a credential, `guard` turns session state into
//! route decisions, and `navigation` is the seam to the host's router.

pub mod claims;
pub mod guard;
pub mod manager;
pub mod navigation;

pub use claims::{ClaimsError, IdentityClaims, decode_claims};
pub use guard::{GuardDecision, guard_route};
pub use manager::{Authenticated, Credential, Readiness, SessionManager, SessionState};
pub use navigation::{LogNavigator, Navigator, Route};
