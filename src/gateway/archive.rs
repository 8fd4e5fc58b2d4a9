//! Archive handlers: upload, download, text preview/edit, delete.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use super::pages::{escape_html, format_size, layout};
use super::{internal_error, page_not_found, require_user, AppState, RequestIdentity};
use crate::archive::{is_editable, ArchivedFile};

#[derive(Debug, Deserialize)]
pub struct SaveForm {
    pub content: String,
}

fn upload_failed(user: &RequestIdentity, message: &str) -> Response {
    let body = format!(
        r#"<div class="card"><h1>Upload failed</h1>
<p>{}</p>
<p class="link"><a href="/">Back to your desk</a></p></div>"#,
        escape_html(message),
    );
    (
        StatusCode::BAD_REQUEST,
        Html(layout("Upload failed", Some(user), &body)),
    )
        .into_response()
}

/// POST /archive/upload: store the first `file` part of the multipart body.
pub async fn handle_archive_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return upload_failed(&user, &err.to_string()),
        };
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().map(str::to_string).unwrap_or_default();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return upload_failed(&user, &err.to_string()),
        };
        if bytes.is_empty() {
            return upload_failed(&user, "The file is empty.");
        }

        return match state.archive.save(&user.username, &original_name, &bytes) {
            Ok(_) => Redirect::to("/").into_response(),
            Err(err) => upload_failed(&user, &err.to_string()),
        };
    }

    upload_failed(&user, "No file found in the upload.")
}

/// GET /archive/{id}: send the blob back with its original name.
pub async fn handle_archive_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    let file = match state.archive.get(&user.username, id) {
        Ok(Some(file)) => file,
        Ok(None) => return page_not_found(Some(&user)),
        Err(err) => return internal_error(err),
    };
    let content = match state.archive.read_content(&file) {
        Ok(content) => content,
        Err(err) => return internal_error(err),
    };

    let mime = mime_guess::from_path(&file.original_name).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    sanitize_filename(&file.original_name)
                ),
            ),
        ],
        content,
    )
        .into_response()
}

/// GET /archive/{id}/view: in-browser editor for text files.
pub async fn handle_archive_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    let file = match state.archive.get(&user.username, id) {
        Ok(Some(file)) => file,
        Ok(None) => return page_not_found(Some(&user)),
        Err(err) => return internal_error(err),
    };

    if !is_editable(&file.original_name) {
        return Html(render_file_details(&user, &file)).into_response();
    }

    let content = match state.archive.read_content(&file) {
        Ok(content) => content,
        Err(err) => return internal_error(err),
    };
    let text = String::from_utf8_lossy(&content);
    Html(render_file_editor(&user, &file, &text)).into_response()
}

/// POST /archive/{id}/save: overwrite a text file's content.
pub async fn handle_archive_save(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Form(form): Form<SaveForm>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    let file = match state.archive.get(&user.username, id) {
        Ok(Some(file)) => file,
        Ok(None) => return page_not_found(Some(&user)),
        Err(err) => return internal_error(err),
    };
    if !is_editable(&file.original_name) {
        return (
            StatusCode::BAD_REQUEST,
            Html(render_file_details(&user, &file)),
        )
            .into_response();
    }
    match state.archive.write_content(&file, form.content.as_bytes()) {
        Ok(()) => Redirect::to(&format!("/archive/{id}/view")).into_response(),
        Err(err) => internal_error(err),
    }
}

pub async fn handle_archive_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state.archive.delete(&user.username, id) {
        Ok(true) => Redirect::to("/").into_response(),
        Ok(false) => page_not_found(Some(&user)),
        Err(err) => internal_error(err),
    }
}

/// Strip characters that would break the Content-Disposition header.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch == '"' || ch == '\\' || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

fn render_file_details(user: &RequestIdentity, file: &ArchivedFile) -> String {
    let body = format!(
        r#"<section class="panel">
<h2>{name}</h2>
<p class="muted">{size} &middot; uploaded {date}</p>
<p>Preview is only available for text files.</p>
<p style="margin-top:14px">
  <a class="btn btn-primary" href="/archive/{id}">Download</a>
  <a class="btn" href="/">Back to your desk</a>
</p>
</section>"#,
        id = file.id,
        name = escape_html(&file.original_name),
        size = format_size(file.size_bytes),
        date = escape_html(file.uploaded_at.get(..10).unwrap_or(&file.uploaded_at)),
    );
    layout(&file.original_name, Some(user), &body)
}

fn render_file_editor(user: &RequestIdentity, file: &ArchivedFile, content: &str) -> String {
    let body = format!(
        r#"<section class="panel">
<h2>{name}</h2>
<p class="muted">{size}</p>
<form method="POST" action="/archive/{id}/save">
  <div class="form-group">
    <textarea name="content" spellcheck="false">{content}</textarea>
  </div>
  <button type="submit" class="btn btn-primary">Save</button>
  <a class="btn" href="/archive/{id}">Download</a>
  <a class="btn" href="/">Back to your desk</a>
</form>
</section>"#,
        id = file.id,
        name = escape_html(&file.original_name),
        size = format_size(file.size_bytes),
        content = escape_html(content),
    );
    layout(&file.original_name, Some(user), &body)
}
