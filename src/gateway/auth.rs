//! Login, registration, and logout handlers.
//!
//! ## Design
//!
//! - Successful login/registration issues a session token and sets it in an
//!   `HttpOnly` cookie, then redirects to the dashboard.
//! - Failed form submissions re-render the same page with an inline error so
//!   the visitor never lands on a bare error response.
//! - Logout revokes the stored session before the redirect; a storage failure
//!   there is a real error, not a silent no-op.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use super::pages::{escape_html, layout};
use super::{client_key_from_headers, internal_error, session_token, AppState, SESSION_COOKIE};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub password_confirm: String,
}

fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Issue a fresh session for `user_id` and send the visitor to the dashboard.
fn start_session(state: &AppState, user_id: i64) -> Response {
    let token = match state.auth.create_session(user_id) {
        Ok(token) => token,
        Err(err) => return internal_error(err),
    };
    (
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(&token, state.session_ttl_secs),
        )]),
        Redirect::to("/"),
    )
        .into_response()
}

pub async fn handle_login_page() -> Html<String> {
    Html(render_login_page(None))
}

pub async fn handle_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    if !state
        .credential_limiter
        .allow(&client_key_from_headers(&headers))
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Html(render_login_page(Some(
                "Too many attempts. Try again in a minute.",
            ))),
        )
            .into_response();
    }

    let user = match state.auth.authenticate(&form.username, &form.password) {
        Ok(user) => user,
        Err(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Html(render_login_page(Some("Invalid username or password."))),
            )
                .into_response();
        }
    };

    tracing::info!(username = %user.username, "login");
    start_session(&state, user.id)
}

pub async fn handle_register_page(State(state): State<AppState>) -> Response {
    if !state.allow_registration {
        return (
            StatusCode::FORBIDDEN,
            Html(render_register_page(Some("Registration is disabled."))),
        )
            .into_response();
    }
    Html(render_register_page(None)).into_response()
}

pub async fn handle_register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Response {
    if !state
        .credential_limiter
        .allow(&client_key_from_headers(&headers))
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Html(render_register_page(Some(
                "Too many attempts. Try again in a minute.",
            ))),
        )
            .into_response();
    }

    if !state.allow_registration {
        return (
            StatusCode::FORBIDDEN,
            Html(render_register_page(Some("Registration is disabled."))),
        )
            .into_response();
    }

    if state.max_users > 0 {
        let count = match state.auth.user_count() {
            Ok(count) => count,
            Err(err) => return internal_error(err),
        };
        if count >= state.max_users {
            return (
                StatusCode::FORBIDDEN,
                Html(render_register_page(Some("Registration is closed."))),
            )
                .into_response();
        }
    }

    if form.password != form.password_confirm {
        return (
            StatusCode::BAD_REQUEST,
            Html(render_register_page(Some("Passwords do not match."))),
        )
            .into_response();
    }

    let user_id = match state.auth.register(&form.username, &form.password) {
        Ok(id) => id,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_register_page(Some(&err.to_string()))),
            )
                .into_response();
        }
    };

    tracing::info!(username = %form.username.trim(), "registered");
    start_session(&state, user_id)
}

/// Revoke the current session, then clear the cookie and redirect home.
pub async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        if let Err(err) = state.auth.revoke_session(token) {
            return internal_error(err);
        }
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        Redirect::to("/"),
    )
        .into_response()
}

fn render_login_page(error: Option<&str>) -> String {
    render_credentials_page(
        "Log in",
        "/login",
        "Log in",
        r#"<p class="link">No account? <a href="/register">Sign up</a></p>"#,
        false,
        error,
    )
}

fn render_register_page(error: Option<&str>) -> String {
    render_credentials_page(
        "Sign up",
        "/register",
        "Create account",
        r#"<p class="link">Already registered? <a href="/login">Log in</a></p>"#,
        true,
        error,
    )
}

fn render_credentials_page(
    title: &str,
    action: &str,
    submit: &str,
    footer: &str,
    with_confirm: bool,
    error: Option<&str>,
) -> String {
    let error_html = error
        .map(|message| format!(r#"<div class="error">{}</div>"#, escape_html(message)))
        .unwrap_or_default();
    let confirm_html = if with_confirm {
        r#"<div class="form-group">
  <label for="password_confirm">Confirm password</label>
  <input type="password" id="password_confirm" name="password_confirm" required>
</div>"#
    } else {
        ""
    };

    let body = format!(
        r#"<div class="card">
<h1>{title}</h1>
{error_html}
<form method="POST" action="{action}">
  <div class="form-group">
    <label for="username">Username</label>
    <input type="text" id="username" name="username" autocomplete="username" required autofocus>
  </div>
  <div class="form-group">
    <label for="password">Password</label>
    <input type="password" id="password" name="password" required>
  </div>
  {confirm_html}
  <button type="submit" class="btn btn-primary" style="width:100%">{submit}</button>
</form>
{footer}
</div>"#
    );

    layout(title, None, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes_are_strict() {
        let cookie = session_cookie("abc123", 7200);
        assert!(cookie.starts_with("sid=abc123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=7200"));
    }

    #[test]
    fn clearing_the_cookie_zeroes_its_age() {
        let cookie = clear_session_cookie();
        assert!(cookie.starts_with("sid=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn error_banner_only_renders_when_present() {
        assert!(!render_login_page(None).contains(r#"class="error""#));
        let page = render_login_page(Some("Invalid username or password."));
        assert!(page.contains(r#"class="error""#));
        assert!(page.contains("Invalid username or password."));
    }

    #[test]
    fn register_page_asks_for_confirmation() {
        assert!(render_register_page(None).contains("password_confirm"));
        assert!(!render_login_page(None).contains("password_confirm"));
    }
}
