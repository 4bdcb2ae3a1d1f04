//! Account operations: registration, sign-in, current user, sign-out.
//!
//! ERROR HANDLING
//! ==============
//! Registration and sign-in are anonymous dispatches, so a rejected password
//! comes back as an ordinary request error with the backend's message and
//! never tears down a session. Sign-out is best-effort against the backend;
//! the local session always ends.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use reqwest::Method;

use super::dispatch::{ApiError, Dispatcher};
use super::types::{LoginRequest, MessageResponse, RegisterRequest, TokenResponse, UserResponse};
use crate::session::{IdentityClaims, SessionManager};

pub const MIN_PASSWORD_CHARS: usize = 8;

const REGISTER_PATH: &str = "/auth/register";
const LOGIN_PATH: &str = "/auth/login";
const ME_PATH: &str = "/auth/me";
const LOGOUT_PATH: &str = "/auth/logout";

fn validate_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(ApiError::Validation("Please enter your email".to_owned()));
    }
    if !email.contains('@') {
        return Err(ApiError::Validation("Please enter a valid email address".to_owned()));
    }
    Ok(email.to_owned())
}

impl RegisterRequest {
    /// Normalized copy ready to send.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for a missing/invalid email or a
    /// password shorter than [`MIN_PASSWORD_CHARS`].
    pub fn validated(&self) -> Result<Self, ApiError> {
        let email = validate_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ApiError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_owned);
        Ok(Self { email, password: self.password.clone(), name })
    }
}

impl Dispatcher {
    /// `POST /auth/register`
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] before dispatch, otherwise any dispatcher error.
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserResponse, ApiError> {
        let request = request.validated()?;
        let reply = self.dispatch_anonymous(Method::POST, REGISTER_PATH, Some(&request)).await?;
        reply.ok_or_else(|| ApiError::Decode(format!("{REGISTER_PATH}: expected a response body")))
    }

    /// `POST /auth/login`; returns the issued credential without adopting it.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] for a blank email or password, otherwise any
    /// dispatcher error (wrong credentials are an [`ApiError::Request`]).
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let email = validate_email(email)?;
        if password.is_empty() {
            return Err(ApiError::Validation("Please enter your password".to_owned()));
        }
        let request = LoginRequest { email, password: password.to_owned() };
        let reply = self.dispatch_anonymous(Method::POST, LOGIN_PATH, Some(&request)).await?;
        reply.ok_or_else(|| ApiError::Decode(format!("{LOGIN_PATH}: expected a response body")))
    }

    /// `GET /auth/me`
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] from the dispatcher.
    pub async fn current_user(&self) -> Result<UserResponse, ApiError> {
        self.get(ME_PATH).await
    }
}

/// Authenticate against the backend and adopt the issued credential.
///
/// # Errors
///
/// Any error from [`Dispatcher::authenticate`], or [`ApiError::Decode`] if
/// the issued credential carries no usable identity.
pub async fn sign_in(
    dispatcher: &Dispatcher,
    session: &SessionManager,
    email: &str,
    password: &str,
) -> Result<IdentityClaims, ApiError> {
    let token = dispatcher.authenticate(email, password).await?;
    if !session.login(&token.access_token) {
        return Err(ApiError::Decode("issued credential carries no usable identity".to_owned()));
    }
    session
        .claims()
        .ok_or_else(|| ApiError::Decode("session lost its identity during sign-in".to_owned()))
}

/// Tell the backend the user is leaving, then end the local session.
pub async fn sign_out(dispatcher: &Dispatcher, session: &SessionManager) {
    if session.is_authenticated() {
        let result = dispatcher.dispatch::<(), MessageResponse>(Method::POST, LOGOUT_PATH, None).await;
        match result {
            // The unauthorized teardown already ended the session and navigated.
            Err(ApiError::Unauthorized) if !session.is_authenticated() => return,
            Err(e) => tracing::warn!(error = %e, "backend logout failed; ending local session anyway"),
            Ok(_) => {}
        }
    }
    session.logout();
}
