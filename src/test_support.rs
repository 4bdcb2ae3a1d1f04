//! In-process fake of the task backend for tests.
//!
//! Serves the `/auth/*` and `/api/tasks*` contract from memory on an
//! ephemeral localhost port and records every request it sees.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::config::ClientConfig;
use crate::net::Dispatcher;
use crate::net::types::{Task, TaskId, UserId};
use crate::session::{Navigator, Route};

// =============================================================================
// TOKENS
// =============================================================================

/// Build an unsigned three-segment token around `payload`.
pub fn make_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{header}.{body}.signature")
}

pub fn token_for(user_id: UserId, email: &str) -> String {
    make_token(&json!({ "user_id": user_id, "email": email, "exp": 4_102_444_800_i64 }))
}

// =============================================================================
// NAVIGATOR
// =============================================================================

/// Navigator that remembers every route it was sent to.
#[derive(Clone, Default)]
pub struct RecordingNavigator {
    visits: Arc<Mutex<Vec<Route>>>,
}

impl RecordingNavigator {
    pub fn visits(&self) -> Vec<Route> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.visits.lock().unwrap().push(route);
    }
}

// =============================================================================
// FAKE BACKEND
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, (UserId, String)>,
    tokens: HashMap<String, UserId>,
    tasks: Vec<Task>,
    next_user: UserId,
    next_task: TaskId,
    clock: u32,
    requests: Vec<RecordedRequest>,
}

impl Inner {
    fn tick(&mut self) -> String {
        self.clock += 1;
        format!("2026-01-01T00:{:02}:{:02}Z", (self.clock / 60) % 60, self.clock % 60)
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
    gate: Arc<Notify>,
}

pub struct RunningBackend {
    pub backend: FakeBackend,
    pub base_url: String,
}

impl RunningBackend {
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(&ClientConfig::new(&self.base_url).unwrap()).unwrap()
    }
}

impl FakeBackend {
    pub async fn spawn() -> RunningBackend {
        let backend = Self::default();
        let app = backend.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        RunningBackend { backend, base_url: format!("http://{addr}") }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an account and a valid token for it without going through HTTP.
    pub fn seed_user(&self, email: &str, password: &str) -> (UserId, String) {
        let mut inner = self.lock();
        inner.next_user += 1;
        let id = inner.next_user;
        inner.users.insert(email.to_owned(), (id, password.to_owned()));
        let token = token_for(id, email);
        inner.tokens.insert(token.clone(), id);
        (id, token)
    }

    /// Let one request parked on `/gated` proceed to its authorization check.
    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    /// Invalidate every issued token, as if they all expired.
    pub fn revoke_all(&self) {
        self.lock().tokens.clear();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/auth/register", post(register))
            .route("/auth/login", post(login))
            .route("/auth/me", get(me))
            .route("/auth/logout", post(logout))
            .route("/api/tasks", get(list_tasks).post(create_task))
            .route("/api/tasks/{id}", get(get_task).put(update_task).delete(delete_task))
            .route("/api/tasks/{id}/complete", patch(toggle_task))
            .route("/boom", get(boom))
            .route("/boom/json", get(boom_json))
            .route("/empty-ok", get(empty_ok))
            .route("/gated", get(gated))
            .layer(middleware::from_fn_with_state(self.clone(), record))
            .with_state(self.clone())
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<UserId, Response> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        token.and_then(|t| self.lock().tokens.get(t).copied()).ok_or_else(|| {
            error_response(StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR", "Could not validate credentials")
        })
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, axum::Json(json!({ "error": code, "message": message }))).into_response()
}

fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "TASK_NOT_FOUND", "Task not found")
}

async fn record(State(backend): State<FakeBackend>, request: Request, next: Next) -> Response {
    // Scoped so no borrow of the request is held across the await below.
    let recorded = {
        let header_text = |name: header::HeaderName| {
            request.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
        };
        RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_owned(),
            authorization: header_text(header::AUTHORIZATION),
            content_type: header_text(header::CONTENT_TYPE),
        }
    };
    backend.lock().requests.push(recorded);
    next.run(request).await
}

// =============================================================================
// AUTH HANDLERS
// =============================================================================

async fn register(State(backend): State<FakeBackend>, axum::Json(body): axum::Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default().to_owned();
    let mut inner = backend.lock();
    if inner.users.contains_key(&email) {
        return error_response(StatusCode::BAD_REQUEST, "USER_EXISTS", "User with this email already exists");
    }
    inner.next_user += 1;
    let id = inner.next_user;
    inner.users.insert(email.clone(), (id, password));
    (StatusCode::CREATED, axum::Json(json!({ "id": id, "email": email, "name": body["name"] }))).into_response()
}

async fn login(State(backend): State<FakeBackend>, axum::Json(body): axum::Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let mut inner = backend.lock();
    let Some((id, expected)) = inner.users.get(email).cloned() else {
        return error_response(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", "Incorrect email or password");
    };
    if expected != password {
        return error_response(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", "Incorrect email or password");
    }
    let token = token_for(id, email);
    inner.tokens.insert(token.clone(), id);
    axum::Json(json!({ "access_token": token, "token_type": "bearer" })).into_response()
}

async fn me(State(backend): State<FakeBackend>, headers: HeaderMap) -> Response {
    let user_id = match backend.authorize(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let inner = backend.lock();
    let email = inner.users.iter().find(|(_, (id, _))| *id == user_id).map(|(email, _)| email.clone());
    axum::Json(json!({ "id": user_id, "email": email, "name": null })).into_response()
}

async fn logout(State(backend): State<FakeBackend>, headers: HeaderMap) -> Response {
    if let Err(resp) = backend.authorize(&headers) {
        return resp;
    }
    axum::Json(json!({ "message": "Logged out successfully. Please discard your token on the client-side." }))
        .into_response()
}

// =============================================================================
// TASK HANDLERS
// =============================================================================

async fn list_tasks(State(backend): State<FakeBackend>, headers: HeaderMap) -> Response {
    let user_id = match backend.authorize(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let tasks: Vec<Task> = backend.lock().tasks.iter().filter(|t| t.user_id == user_id).cloned().collect();
    axum::Json(tasks).into_response()
}

async fn create_task(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let user_id = match backend.authorize(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let title = body["title"].as_str().unwrap_or_default().trim().to_owned();
    if title.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "Title cannot be empty");
    }
    let mut inner = backend.lock();
    inner.next_task += 1;
    let now = inner.tick();
    let task = Task {
        id: inner.next_task,
        user_id,
        title,
        description: body["description"].as_str().map(str::to_owned),
        completed: false,
        created_at: now.clone(),
        updated_at: now,
        due_date: body["due_date"].as_str().map(str::to_owned),
    };
    inner.tasks.push(task.clone());
    (StatusCode::CREATED, axum::Json(task)).into_response()
}

async fn get_task(State(backend): State<FakeBackend>, headers: HeaderMap, Path(id): Path<TaskId>) -> Response {
    let user_id = match backend.authorize(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let inner = backend.lock();
    match inner.tasks.iter().find(|t| t.id == id && t.user_id == user_id) {
        Some(task) => axum::Json(task.clone()).into_response(),
        None => not_found(),
    }
}

async fn update_task(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Path(id): Path<TaskId>,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let user_id = match backend.authorize(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let mut inner = backend.lock();
    let now = inner.tick();
    let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id && t.user_id == user_id) else {
        return not_found();
    };
    if let Some(title) = body["title"].as_str() {
        task.title = title.to_owned();
    }
    if let Some(description) = body["description"].as_str() {
        task.description = Some(description.to_owned());
    }
    if let Some(due_date) = body["due_date"].as_str() {
        task.due_date = Some(due_date.to_owned());
    }
    task.updated_at = now;
    axum::Json(task.clone()).into_response()
}

async fn delete_task(State(backend): State<FakeBackend>, headers: HeaderMap, Path(id): Path<TaskId>) -> Response {
    let user_id = match backend.authorize(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let mut inner = backend.lock();
    let before = inner.tasks.len();
    inner.tasks.retain(|t| !(t.id == id && t.user_id == user_id));
    if inner.tasks.len() == before {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn toggle_task(State(backend): State<FakeBackend>, headers: HeaderMap, Path(id): Path<TaskId>) -> Response {
    let user_id = match backend.authorize(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let mut inner = backend.lock();
    let now = inner.tick();
    let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id && t.user_id == user_id) else {
        return not_found();
    };
    task.completed = !task.completed;
    task.updated_at = now;
    axum::Json(task.clone()).into_response()
}

// =============================================================================
// FAILURE FIXTURES
// =============================================================================

async fn boom() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

async fn boom_json() -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "MAINTENANCE", "Backend is down for maintenance")
}

async fn empty_ok() -> Response {
    StatusCode::OK.into_response()
}

/// Parks until `open_gate`, then checks the credential the request carried.
async fn gated(State(backend): State<FakeBackend>, headers: HeaderMap) -> Response {
    backend.gate.notified().await;
    match backend.authorize(&headers) {
        Ok(user_id) => axum::Json(json!({ "user_id": user_id })).into_response(),
        Err(resp) => resp,
    }
}
