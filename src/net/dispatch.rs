//! Authenticated request dispatcher.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every backend call goes through [`Dispatcher`]. It reads the current
//! credential through hooks registered by the session manager, attaches it
//! as a bearer token, and classifies the response.
//!
//! ERROR HANDLING
//! ==============
//! A 401 on a session-scoped request invokes the registered deregistration
//! callback exactly once and fails with [`ApiError::Unauthorized`] without
//! reading the body. Any other non-2xx becomes [`ApiError::Request`] carrying
//! the backend's message, or a generic fallback when the body is not the
//! structured error shape. The dispatcher never touches session state itself.

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_test;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};

use super::types::ApiErrorBody;
use crate::config::ClientConfig;

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized - please log in again";

// =============================================================================
// ERROR
// =============================================================================

/// Failure surfaced to callers of any backend operation.
///
/// `Display` is the user-facing message for every variant.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend rejected the credential; the session has been told to end.
    #[error("Unauthorized - please log in again")]
    Unauthorized,

    /// The backend answered with a non-success status other than 401.
    #[error("{message}")]
    Request { status: u16, code: String, message: String },

    /// Input rejected locally before any request was sent.
    #[error("{0}")]
    Validation(String),

    /// The request never produced a response.
    #[error("network request failed: {0}")]
    Transport(String),

    /// A success response did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Request { .. } => "E_REQUEST",
            Self::Validation(_) => "E_VALIDATION",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Decode(_) => "E_DECODE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// Whether a user-initiated retry could plausibly succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Request { status: 429 | 500..=599, .. })
    }

    /// HTTP status of the failed response, if there was one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// SESSION HOOKS
// =============================================================================

/// The dispatcher's view of the session at the moment a request is built.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub token: Option<String>,
    /// Session generation the token belongs to. Handed back to the
    /// deregistration callback so it can ignore stale 401s.
    pub generation: u64,
}

impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("generation", &self.generation)
            .finish()
    }
}

pub type CredentialAccessor = Arc<dyn Fn() -> SessionSnapshot + Send + Sync>;
pub type DeregisterCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Accessor + deregistration callback supplied by the session owner.
#[derive(Clone)]
pub struct SessionHooks {
    credential: CredentialAccessor,
    deregister: DeregisterCallback,
}

impl SessionHooks {
    pub fn new<C, D>(credential: C, deregister: D) -> Self
    where
        C: Fn() -> SessionSnapshot + Send + Sync + 'static,
        D: Fn(u64) + Send + Sync + 'static,
    {
        Self { credential: Arc::new(credential), deregister: Arc::new(deregister) }
    }
}

impl std::fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionHooks { .. }")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Audience {
    /// Carries the session credential; a 401 ends the session.
    Session,
    /// Credential-less call (sign-in, registration); a 401 is an ordinary failure.
    Anonymous,
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// Issues all backend requests and classifies their outcomes.
///
/// Cheap to clone; clones share the registered hooks.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    http: reqwest::Client,
    base_url: String,
    hooks: Arc<RwLock<Option<SessionHooks>>>,
}

impl Dispatcher {
    /// Build a dispatcher for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.api_url.clone(), hooks: Arc::new(RwLock::new(None)) })
    }

    /// Install the session owner's hooks. Later calls replace earlier ones.
    pub fn register_session(&self, hooks: SessionHooks) {
        let mut slot = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::debug!("replacing registered session hooks");
        }
        *slot = Some(hooks);
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn registered(&self) -> Option<SessionHooks> {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Send a session-scoped request.
    ///
    /// Returns `Ok(None)` for a no-content success and `Ok(Some(body))`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthorized`] on 401 (after invoking the deregistration
    /// callback), [`ApiError::Request`] on any other failure status,
    /// [`ApiError::Transport`] / [`ApiError::Decode`] on I/O or shape errors.
    pub async fn dispatch<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Audience::Session, method, path, body).await
    }

    /// Send a request without the session credential. A 401 here is an
    /// ordinary [`ApiError::Request`] and leaves the session alone.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::dispatch`] minus the unauthorized teardown.
    pub async fn dispatch_anonymous<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Audience::Anonymous, method, path, body).await
    }

    /// `GET` a path that must return a body.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`]; an empty success is a [`ApiError::Decode`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let reply = self.dispatch::<(), T>(Method::GET, path, None).await?;
        expect_body(reply, path)
    }

    /// Send a JSON body and decode the response body.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`]; an empty success is a [`ApiError::Decode`].
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let reply = self.dispatch(method, path, Some(body)).await?;
        expect_body(reply, path)
    }

    /// Send a bodiless request and decode the response body.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`]; an empty success is a [`ApiError::Decode`].
    pub async fn send_empty<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, ApiError> {
        let reply = self.dispatch::<(), T>(method, path, None).await?;
        expect_body(reply, path)
    }

    /// `DELETE` a path, discarding any response body.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.dispatch::<(), IgnoredAny>(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn execute<B, T>(
        &self,
        audience: Audience,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let hooks = match audience {
            Audience::Session => self.registered(),
            Audience::Anonymous => None,
        };
        let snapshot = hooks.as_ref().map(|h| (h.credential)()).unwrap_or_default();

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = snapshot.token.as_deref() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, path, authenticated = snapshot.token.is_some(), "dispatching request");
        let response = request.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED && audience == Audience::Session {
            tracing::warn!(%method, path, generation = snapshot.generation, "request unauthorized; ending session");
            if let Some(hooks) = hooks {
                (hooks.deregister)(snapshot.generation);
            }
            return Err(ApiError::Unauthorized);
        }

        let text = response.text().await.map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let body = ApiErrorBody::parse_or_unknown(&text);
            tracing::debug!(%method, path, status = status.as_u16(), code = %body.error, "request failed");
            return Err(ApiError::Request {
                status: status.as_u16(),
                message: body.display_message().to_owned(),
                code: body.error,
            });
        }

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }
}

fn expect_body<T>(reply: Option<T>, path: &str) -> Result<T, ApiError> {
    reply.ok_or_else(|| ApiError::Decode(format!("{path}: expected a response body")))
}
