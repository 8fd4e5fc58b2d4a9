//! Server-rendered pages: shared layout, dashboard, error pages.
//!
//! Pure rendering — every function here takes data and returns HTML.
//! User-supplied text always passes through [`escape_html`].

use super::RequestIdentity;
use crate::archive::{is_editable, ArchivedFile};
use crate::exercises::Exercise;
use crate::notes::Note;

pub fn base_style() -> &'static str {
    r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
        background: #f4f5f7; color: #1a1a2e; min-height: 100vh;
    }
    nav {
        display: flex; justify-content: space-between; align-items: center;
        background: #1a1a2e; color: #fff; padding: 12px 24px;
    }
    nav .brand { color: #fff; font-weight: 700; font-size: 18px; text-decoration: none; }
    nav .nav-right { display: flex; align-items: center; gap: 12px; }
    nav .nav-right a { color: #cdd2ff; text-decoration: none; font-size: 14px; }
    nav .who { color: #8b93b5; font-size: 14px; }
    main { max-width: 860px; margin: 24px auto; padding: 0 16px; }
    .panel {
        background: #fff; border-radius: 12px; padding: 20px;
        margin-bottom: 20px; box-shadow: 0 1px 4px rgba(0,0,0,0.08);
    }
    .panel-head { display: flex; justify-content: space-between; align-items: center; margin-bottom: 12px; }
    .panel-head h2 { font-size: 18px; }
    .items { list-style: none; }
    .items li {
        display: flex; justify-content: space-between; align-items: center;
        gap: 12px; padding: 10px 0; border-bottom: 1px solid #eee;
    }
    .items li:last-child { border-bottom: none; }
    .items a { color: #4a6cf7; text-decoration: none; }
    .actions { display: flex; gap: 8px; align-items: center; flex-shrink: 0; }
    .actions form { display: inline; }
    .muted { color: #777; font-size: 13px; }
    .empty { color: #999; font-size: 14px; padding: 8px 0; }
    .btn {
        display: inline-block; padding: 6px 12px; border-radius: 8px; border: 1px solid #ccd;
        background: #fff; color: #1a1a2e; font-size: 13px; cursor: pointer; text-decoration: none;
    }
    .btn-primary { background: #4a6cf7; border-color: #4a6cf7; color: #fff; }
    .btn-danger { background: #fff; border-color: #e05555; color: #e05555; }
    .btn:hover { filter: brightness(0.95); }
    .form-group { margin-bottom: 14px; }
    .form-group label { display: block; font-size: 13px; color: #555; margin-bottom: 4px; }
    .form-group input[type=text], .form-group input[type=password],
    .form-group input[type=number], .form-group textarea {
        width: 100%; padding: 8px 10px; border: 1px solid #ccd; border-radius: 8px; font-size: 14px;
    }
    .form-group textarea { min-height: 160px; font-family: inherit; }
    .error {
        background: #fdecec; color: #b33030; border: 1px solid #f5c2c2;
        border-radius: 8px; padding: 10px 12px; margin-bottom: 14px; font-size: 14px;
    }
    .card { background: #fff; border-radius: 12px; padding: 28px; max-width: 420px;
        margin: 48px auto; box-shadow: 0 1px 6px rgba(0,0,0,0.1); }
    .card h1 { font-size: 22px; margin-bottom: 16px; text-align: center; }
    .link { text-align: center; margin-top: 14px; font-size: 14px; }
    .link a { color: #4a6cf7; }
    .upload { display: flex; gap: 10px; align-items: center; margin-bottom: 10px; }
    .dropzone {
        border: 2px dashed #ccd; border-radius: 10px; padding: 18px; text-align: center;
        color: #999; font-size: 14px; margin-bottom: 12px;
    }
    .dropzone.dragover { border-color: #4a6cf7; color: #4a6cf7; background: #f4f6ff; }
    .question { border: 1px solid #eee; border-radius: 10px; padding: 14px; margin-bottom: 14px; }
    .question h3 { font-size: 15px; margin-bottom: 10px; }
    .option { display: flex; gap: 8px; margin-bottom: 8px; align-items: center; }
    .option input[type=text] { flex: 3; }
    .option input[type=number] { flex: 1; }
    .choice { display: block; padding: 6px 0; font-size: 14px; }
    table.results { width: 100%; border-collapse: collapse; font-size: 14px; }
    table.results th, table.results td { text-align: left; padding: 8px; border-bottom: 1px solid #eee; }
    .ok { color: #2e9e5b; font-weight: 600; }
    .partial { color: #d98e04; font-weight: 600; }
    .miss { color: #b33030; font-weight: 600; }
    "#
}

/// Escape text for interpolation into HTML.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Shared page frame: nav bar with session controls, then `body`.
pub fn layout(title: &str, user: Option<&RequestIdentity>, body: &str) -> String {
    let nav_right = match user {
        Some(user) => format!(
            r#"<span class="who">{}</span>
            <form method="POST" action="/logout"><button class="btn">Log out</button></form>"#,
            escape_html(&user.username)
        ),
        None => r#"<a href="/login">Log in</a> <a href="/register">Sign up</a>"#.to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>Study Desk - {title}</title>
<style>{style}</style>
</head><body>
<nav><a class="brand" href="/">Study Desk</a><div class="nav-right">{nav_right}</div></nav>
<main>{body}</main>
</body></html>"#,
        title = escape_html(title),
        style = base_style(),
    )
}

pub fn render_dashboard(
    user: &RequestIdentity,
    notes: &[Note],
    exercises: &[Exercise],
    files: &[ArchivedFile],
) -> String {
    let notes_html = if notes.is_empty() {
        r#"<p class="empty">No notes yet.</p>"#.to_string()
    } else {
        let rows: String = notes
            .iter()
            .map(|note| {
                format!(
                    r#"<li><div><strong>{title}</strong><p class="muted">{snippet}</p></div>
                    <div class="actions">
                      <a class="btn" href="/notes/{id}/edit">Edit</a>
                      <form method="POST" action="/notes/{id}/delete"><button class="btn btn-danger">Delete</button></form>
                    </div></li>"#,
                    id = note.id,
                    title = escape_html(&note.title),
                    snippet = escape_html(&snippet(&note.content, 80)),
                )
            })
            .collect();
        format!(r#"<ul class="items">{rows}</ul>"#)
    };

    let exercises_html = if exercises.is_empty() {
        r#"<p class="empty">No exercises yet.</p>"#.to_string()
    } else {
        let rows: String = exercises
            .iter()
            .map(|exercise| {
                format!(
                    r#"<li><div><a href="/exercises/{id}"><strong>{name}</strong></a>
                    <p class="muted">{description} &middot; {count} question(s)</p></div>
                    <div class="actions">
                      <a class="btn" href="/exercises/{id}/edit">Edit</a>
                      <form method="POST" action="/exercises/{id}/delete"><button class="btn btn-danger">Delete</button></form>
                    </div></li>"#,
                    id = exercise.id,
                    name = escape_html(&exercise.name),
                    description = escape_html(&exercise.description),
                    count = exercise.questions.len(),
                )
            })
            .collect();
        format!(r#"<ul class="items">{rows}</ul>"#)
    };

    let files_html = if files.is_empty() {
        r#"<p class="empty">Nothing archived yet.</p>"#.to_string()
    } else {
        let rows: String = files
            .iter()
            .map(|file| {
                let view = if is_editable(&file.original_name) {
                    format!(r#"<a class="btn" href="/archive/{}/view">View</a>"#, file.id)
                } else {
                    String::new()
                };
                format!(
                    r#"<li><div><a href="/archive/{id}">{name}</a>
                    <p class="muted">{size} &middot; {date}</p></div>
                    <div class="actions">{view}
                      <form method="POST" action="/archive/{id}/delete"><button class="btn btn-danger">Delete</button></form>
                    </div></li>"#,
                    id = file.id,
                    name = escape_html(&file.original_name),
                    size = format_size(file.size_bytes),
                    date = escape_html(file.uploaded_at.get(..10).unwrap_or(&file.uploaded_at)),
                )
            })
            .collect();
        format!(r#"<ul class="items">{rows}</ul>"#)
    };

    let body = format!(
        r#"<section class="panel">
  <div class="panel-head"><h2>Notes</h2><a class="btn btn-primary" href="/notes/new">New note</a></div>
  {notes_html}
</section>
<section class="panel">
  <div class="panel-head"><h2>Exercises</h2><a class="btn btn-primary" href="/exercises/new">New exercise</a></div>
  {exercises_html}
</section>
<section class="panel">
  <div class="panel-head"><h2>Archive</h2></div>
  <form id="upload-form" class="upload" method="POST" action="/archive/upload" enctype="multipart/form-data">
    <input type="file" name="file" required>
    <button type="submit" class="btn btn-primary">Upload</button>
  </form>
  <div id="dropzone" class="dropzone">Drop a file here to upload</div>
  {files_html}
  <script src="/assets/dropfile.js" defer></script>
</section>"#
    );

    layout("Home", Some(user), &body)
}

pub fn render_not_found(user: Option<&RequestIdentity>) -> String {
    let who = user
        .map(|user| {
            format!(
                r#"<p class="muted">Signed in as {}.</p>"#,
                escape_html(&user.username)
            )
        })
        .unwrap_or_default();
    let body = format!(
        r#"<div class="card"><h1>Page not found</h1>
<p>That page does not exist. <a href="/">Back to your desk.</a></p>
{who}</div>"#
    );
    layout("Not found", user, &body)
}

pub fn render_server_error() -> String {
    layout(
        "Error",
        None,
        r#"<div class="card"><h1>Something went wrong</h1>
<p>The request could not be completed. <a href="/">Back to your desk.</a></p></div>"#,
    )
}

/// First line of `content`, cut to `max_chars` with an ellipsis.
pub fn snippet(content: &str, max_chars: usize) -> String {
    let line = content.lines().next().unwrap_or("");
    let mut out: String = line.chars().take(max_chars).collect();
    if line.chars().count() > max_chars {
        out.push('…');
    }
    out
}

/// Human-readable byte count.
pub fn format_size(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes.max(0) as f64;
    if value < KIB {
        format!("{value:.0} B")
    } else if value < KIB * KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{:.1} MiB", value / (KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("a & b's"), "a &amp; b&#39;s");
    }

    #[test]
    fn layout_shows_session_controls_for_users() {
        let identity = RequestIdentity {
            id: 1,
            username: "ana".to_string(),
        };
        let page = layout("Home", Some(&identity), "<p>hi</p>");
        assert!(page.contains("ana"));
        assert!(page.contains("/logout"));
        assert!(!page.contains(r#"href="/login""#));
    }

    #[test]
    fn layout_shows_login_links_for_anonymous() {
        let page = layout("Home", None, "<p>hi</p>");
        assert!(page.contains(r#"href="/login""#));
        assert!(!page.contains("/logout"));
    }

    #[test]
    fn dashboard_escapes_user_content() {
        let identity = RequestIdentity {
            id: 1,
            username: "ana".to_string(),
        };
        let notes = vec![crate::notes::Note {
            id: 1,
            owner: "ana".to_string(),
            title: "<b>bold</b>".to_string(),
            content: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }];
        let page = render_dashboard(&identity, &notes, &[], &[]);
        assert!(page.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(!page.contains("<b>bold</b>"));
    }

    #[test]
    fn snippet_cuts_to_first_line() {
        assert_eq!(snippet("one\ntwo", 80), "one");
        assert_eq!(snippet("abcdef", 3), "abc…");
        assert_eq!(snippet("", 10), "");
    }

    #[test]
    fn format_size_picks_sensible_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
