//! Axum-based HTTP gateway: session-aware HTML routes over the domain stores.
//!
//! ## Design
//!
//! - Each request resolves its identity from the session cookie at most once,
//!   through [`maybe_user`] (pages that also work anonymously) or
//!   [`require_user`] (pages that redirect anonymous visitors to `/login`).
//! - Request body size limits and timeouts guard the listener; credential
//!   routes are additionally rate limited per client key.
//! - Handlers return complete HTML pages; failed forms re-render inline.

pub mod archive;
pub mod assets;
pub mod auth;
pub mod exercises;
pub mod notes;
pub mod pages;

use crate::archive::ArchiveStore;
use crate::auth::AuthStore;
use crate::config::Config;
use crate::exercises::ExerciseStore;
use crate::notes::NoteStore;
use crate::store::Store;
use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sid";
/// Sliding window used by gateway rate limiting.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// How often the rate limiter sweeps stale client entries from its map.
const RATE_LIMITER_SWEEP_INTERVAL_SECS: u64 = 300; // 5 minutes

#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    limit_per_window: u32,
    window: Duration,
    requests: Mutex<(HashMap<String, Vec<Instant>>, Instant)>,
}

impl SlidingWindowRateLimiter {
    fn new(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit_per_window,
            window,
            requests: Mutex::new((HashMap::new(), Instant::now())),
        }
    }

    fn allow(&self, key: &str) -> bool {
        if self.limit_per_window == 0 {
            return true;
        }

        let now = Instant::now();
        let cutoff = now.checked_sub(self.window).unwrap_or_else(Instant::now);

        let mut guard = self.requests.lock();
        let (requests, last_sweep) = &mut *guard;

        // Periodic sweep: drop clients with no recent requests
        if last_sweep.elapsed() >= Duration::from_secs(RATE_LIMITER_SWEEP_INTERVAL_SECS) {
            requests.retain(|_, timestamps| {
                timestamps.retain(|t| *t > cutoff);
                !timestamps.is_empty()
            });
            *last_sweep = now;
        }

        let entry = requests.entry(key.to_owned()).or_default();
        entry.retain(|instant| *instant > cutoff);

        if entry.len() >= self.limit_per_window as usize {
            return false;
        }

        entry.push(now);
        true
    }
}

fn client_key_from_headers(headers: &HeaderMap) -> String {
    for header_name in ["X-Forwarded-For", "X-Real-IP"] {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }
    "unknown".into()
}

/// Pull the session token out of the Cookie header, if any.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

/// The identity attached to a request once its session checks out.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub id: i64,
    pub username: String,
}

/// Soft identity resolution: `None` for anonymous visitors, expired sessions,
/// and lookup failures. Never fails the request.
pub fn maybe_user(state: &AppState, headers: &HeaderMap) -> Option<RequestIdentity> {
    let token = session_token(headers)?;
    let session = state.auth.validate_session(token)?;
    match state.auth.get_user(session.user_id) {
        Ok(Some(user)) => Some(RequestIdentity {
            id: user.id,
            username: user.username,
        }),
        Ok(None) => None,
        Err(err) => {
            tracing::warn!("user lookup for a valid session failed: {err:#}");
            None
        }
    }
}

/// Hard identity resolution: anonymous visitors get sent to the login page.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<RequestIdentity, Redirect> {
    maybe_user(state, headers).ok_or_else(|| Redirect::to("/login"))
}

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthStore>,
    pub notes: Arc<NoteStore>,
    pub exercises: Arc<ExerciseStore>,
    pub archive: Arc<ArchiveStore>,
    pub credential_limiter: Arc<SlidingWindowRateLimiter>,
    /// Whether new user registration is allowed.
    pub allow_registration: bool,
    /// Maximum registered users (0 = unlimited).
    pub max_users: u64,
    pub session_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config, store: Store) -> Result<Self> {
        Ok(Self {
            auth: Arc::new(AuthStore::new(
                store.clone(),
                config.auth.session_ttl_secs,
            )),
            notes: Arc::new(NoteStore::new(store.clone())),
            exercises: Arc::new(ExerciseStore::new(store.clone())),
            archive: Arc::new(ArchiveStore::new(store, config.uploads_dir())?),
            credential_limiter: Arc::new(SlidingWindowRateLimiter::new(
                config.auth.credential_attempts_per_minute,
                Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            )),
            allow_registration: config.auth.allow_registration,
            max_users: config.auth.max_users,
            session_ttl_secs: config.auth.session_ttl_secs,
            request_timeout_secs: config.server.request_timeout_secs,
            max_upload_bytes: config.archive.max_upload_bytes,
        })
    }
}

/// Build the full application router with middleware.
pub fn router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.request_timeout_secs.max(1));
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(handle_dashboard))
        .route("/health", get(handle_health))
        .route("/login", get(auth::handle_login_page))
        .route("/login", post(auth::handle_login))
        .route("/register", get(auth::handle_register_page))
        .route("/register", post(auth::handle_register))
        .route("/logout", post(auth::handle_logout))
        .route("/notes/new", get(notes::handle_note_new_page))
        .route("/notes/new", post(notes::handle_note_create))
        .route("/notes/{id}/edit", get(notes::handle_note_edit_page))
        .route("/notes/{id}/edit", post(notes::handle_note_update))
        .route("/notes/{id}/delete", post(notes::handle_note_delete))
        .route("/exercises/new", get(exercises::handle_exercise_new_page))
        .route("/exercises/new", post(exercises::handle_exercise_create))
        .route("/exercises/{id}", get(exercises::handle_exercise_take_page))
        .route(
            "/exercises/{id}/result",
            post(exercises::handle_exercise_result),
        )
        .route(
            "/exercises/{id}/edit",
            get(exercises::handle_exercise_edit_page),
        )
        .route(
            "/exercises/{id}/edit",
            post(exercises::handle_exercise_update),
        )
        .route(
            "/exercises/{id}/delete",
            post(exercises::handle_exercise_delete),
        )
        .route("/archive/upload", post(archive::handle_archive_upload))
        .route("/archive/{id}", get(archive::handle_archive_download))
        .route("/archive/{id}/view", get(archive::handle_archive_view))
        .route("/archive/{id}/save", post(archive::handle_archive_save))
        .route("/archive/{id}/delete", post(archive::handle_archive_delete))
        .route("/assets/{*path}", get(assets::handle_asset))
        .fallback(handle_not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

/// Bind and serve until the process is stopped.
pub async fn run(config: Config, store: Store) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    let state = AppState::new(&config, store)?;
    let app = router(state);

    println!("📚 Study Desk listening on http://{display_addr}");
    println!("  GET  /          — your desk (notes, exercises, archive)");
    println!("  GET  /login     — log in");
    println!("  GET  /register  — create an account");
    println!("  GET  /health    — health check");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        return;
    }
    tracing::info!("shutdown signal received, draining connections");
}

// ══════════════════════════════════════════════════════════════════════════════
// SHARED RESPONSES
// ══════════════════════════════════════════════════════════════════════════════

/// Log the failure, answer with the generic error page.
pub(crate) fn internal_error(err: anyhow::Error) -> Response {
    tracing::error!("request failed: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(pages::render_server_error()),
    )
        .into_response()
}

pub(crate) fn page_not_found(user: Option<&RequestIdentity>) -> Response {
    (StatusCode::NOT_FOUND, Html(pages::render_not_found(user))).into_response()
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET / — the signed-in dashboard.
async fn handle_dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    let notes = match state.notes.list(&user.username) {
        Ok(notes) => notes,
        Err(err) => return internal_error(err),
    };
    let exercises = match state.exercises.list(&user.username) {
        Ok(exercises) => exercises,
        Err(err) => return internal_error(err),
    };
    let files = match state.archive.list(&user.username) {
        Ok(files) => files,
        Err(err) => return internal_error(err),
    };
    Html(pages::render_dashboard(&user, &notes, &exercises, &files)).into_response()
}

/// GET /health — always public (no secrets leaked)
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback for unknown paths. Personalizes when a session is present but
/// never demands one.
async fn handle_not_found(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = maybe_user(&state, &headers);
    page_not_found(user.as_ref())
}
