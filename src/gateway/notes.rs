//! Note handlers: create, edit, delete.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use super::pages::{escape_html, layout};
use super::{internal_error, page_not_found, require_user, AppState, RequestIdentity};

#[derive(Debug, Deserialize)]
pub struct NoteForm {
    pub title: String,
    pub content: String,
}

pub async fn handle_note_new_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    Html(render_note_form(&user, None, None, None)).into_response()
}

pub async fn handle_note_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<NoteForm>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state.notes.create(&user.username, &form.title, &form.content) {
        Ok(_) => Redirect::to("/").into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Html(render_note_form(
                &user,
                None,
                Some(&form),
                Some(&err.to_string()),
            )),
        )
            .into_response(),
    }
}

pub async fn handle_note_edit_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state.notes.get(&user.username, id) {
        Ok(Some(note)) => {
            let form = NoteForm {
                title: note.title,
                content: note.content,
            };
            Html(render_note_form(&user, Some(id), Some(&form), None)).into_response()
        }
        Ok(None) => page_not_found(Some(&user)),
        Err(err) => internal_error(err),
    }
}

pub async fn handle_note_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Form(form): Form<NoteForm>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state
        .notes
        .update(&user.username, id, &form.title, &form.content)
    {
        Ok(true) => Redirect::to("/").into_response(),
        Ok(false) => page_not_found(Some(&user)),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Html(render_note_form(
                &user,
                Some(id),
                Some(&form),
                Some(&err.to_string()),
            )),
        )
            .into_response(),
    }
}

pub async fn handle_note_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state.notes.delete(&user.username, id) {
        Ok(true) => Redirect::to("/").into_response(),
        Ok(false) => page_not_found(Some(&user)),
        Err(err) => internal_error(err),
    }
}

/// One form serves both creation (`id` is `None`) and editing.
fn render_note_form(
    user: &RequestIdentity,
    id: Option<i64>,
    prefill: Option<&NoteForm>,
    error: Option<&str>,
) -> String {
    let (heading, action) = match id {
        Some(id) => ("Edit note", format!("/notes/{id}/edit")),
        None => ("New note", "/notes/new".to_string()),
    };
    let error_html = error
        .map(|message| format!(r#"<div class="error">{}</div>"#, escape_html(message)))
        .unwrap_or_default();
    let title = prefill.map(|form| escape_html(&form.title)).unwrap_or_default();
    let content = prefill
        .map(|form| escape_html(&form.content))
        .unwrap_or_default();

    let body = format!(
        r#"<section class="panel">
<h2>{heading}</h2>
{error_html}
<form method="POST" action="{action}">
  <div class="form-group">
    <label for="title">Title</label>
    <input type="text" id="title" name="title" value="{title}" required autofocus>
  </div>
  <div class="form-group">
    <label for="content">Content</label>
    <textarea id="content" name="content">{content}</textarea>
  </div>
  <button type="submit" class="btn btn-primary">Save</button>
  <a class="btn" href="/">Cancel</a>
</form>
</section>"#
    );

    layout(heading, Some(user), &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RequestIdentity {
        RequestIdentity {
            id: 1,
            username: "ana".to_string(),
        }
    }

    #[test]
    fn new_form_posts_to_create_route() {
        let page = render_note_form(&identity(), None, None, None);
        assert!(page.contains(r#"action="/notes/new""#));
        assert!(page.contains("New note"));
    }

    #[test]
    fn edit_form_prefills_and_posts_to_update_route() {
        let form = NoteForm {
            title: "Groceries".to_string(),
            content: "milk & eggs".to_string(),
        };
        let page = render_note_form(&identity(), Some(7), Some(&form), None);
        assert!(page.contains(r#"action="/notes/7/edit""#));
        assert!(page.contains("Groceries"));
        assert!(page.contains("milk &amp; eggs"));
    }
}
