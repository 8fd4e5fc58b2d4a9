//! Exercise handlers: quiz builder, taking, and scoring results.
//!
//! The builder posts flat indexed fields (`q0_title`, `q0_a0_text`, ...) that
//! `assets/quizbuilder.js` grows client-side; the take page posts one
//! `question_{i}` radio value per answered question.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;

use super::pages::{escape_html, layout};
use super::{internal_error, page_not_found, require_user, AppState, RequestIdentity};
use crate::exercises::scoring::{score, QuestionScore};
use crate::exercises::{parse_exercise_form, parse_submission, Exercise, ExerciseDraft};

pub async fn handle_exercise_new_page(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    Html(render_exercise_form(&user, None, None, None)).into_response()
}

pub async fn handle_exercise_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    let draft = match parse_exercise_form(&fields) {
        Ok(draft) => draft,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_exercise_form(&user, None, None, Some(&err.to_string()))),
            )
                .into_response();
        }
    };
    match state.exercises.create(&user.username, &draft) {
        Ok(_) => Redirect::to("/").into_response(),
        Err(err) => internal_error(err),
    }
}

/// GET /exercises/{id}: the take-quiz page.
pub async fn handle_exercise_take_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state.exercises.get(&user.username, id) {
        Ok(Some(exercise)) => Html(render_take_page(&user, &exercise)).into_response(),
        Ok(None) => page_not_found(Some(&user)),
        Err(err) => internal_error(err),
    }
}

/// POST /exercises/{id}/result: score the submission and show the breakdown.
pub async fn handle_exercise_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    let exercise = match state.exercises.get(&user.username, id) {
        Ok(Some(exercise)) => exercise,
        Ok(None) => return page_not_found(Some(&user)),
        Err(err) => return internal_error(err),
    };

    let submitted = parse_submission(&fields, exercise.questions.len());
    match score(&exercise.questions, &submitted) {
        Ok(scores) => Html(render_result_page(&user, &exercise, &scores)).into_response(),
        Err(err) => {
            let body = format!(
                r#"<div class="card"><h1>Cannot score this exercise</h1>
<p>{}</p>
<p class="link"><a href="/exercises/{}/edit">Fix the exercise</a></p></div>"#,
                escape_html(&err.to_string()),
                exercise.id,
            );
            (
                StatusCode::BAD_REQUEST,
                Html(layout("Scoring error", Some(&user), &body)),
            )
                .into_response()
        }
    }
}

pub async fn handle_exercise_edit_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state.exercises.get(&user.username, id) {
        Ok(Some(exercise)) => {
            let draft = ExerciseDraft {
                name: exercise.name,
                description: exercise.description,
                questions: exercise.questions,
            };
            Html(render_exercise_form(&user, Some(id), Some(&draft), None)).into_response()
        }
        Ok(None) => page_not_found(Some(&user)),
        Err(err) => internal_error(err),
    }
}

pub async fn handle_exercise_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    let draft = match parse_exercise_form(&fields) {
        Ok(draft) => draft,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_exercise_form(
                    &user,
                    Some(id),
                    None,
                    Some(&err.to_string()),
                )),
            )
                .into_response();
        }
    };
    match state.exercises.update(&user.username, id, &draft) {
        Ok(true) => Redirect::to("/").into_response(),
        Ok(false) => page_not_found(Some(&user)),
        Err(err) => internal_error(err),
    }
}

pub async fn handle_exercise_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers) {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };
    match state.exercises.delete(&user.username, id) {
        Ok(true) => Redirect::to("/").into_response(),
        Ok(false) => page_not_found(Some(&user)),
        Err(err) => internal_error(err),
    }
}

/// Quiz-builder form. With `prefill` it renders the existing questions so the
/// same template serves create and edit; `quizbuilder.js` adds rows after the
/// ones rendered here.
fn render_exercise_form(
    user: &RequestIdentity,
    id: Option<i64>,
    prefill: Option<&ExerciseDraft>,
    error: Option<&str>,
) -> String {
    let (heading, action) = match id {
        Some(id) => ("Edit exercise", format!("/exercises/{id}/edit")),
        None => ("New exercise", "/exercises/new".to_string()),
    };
    let error_html = error
        .map(|message| format!(r#"<div class="error">{}</div>"#, escape_html(message)))
        .unwrap_or_default();
    let name = prefill.map(|draft| escape_html(&draft.name)).unwrap_or_default();
    let description = prefill
        .map(|draft| escape_html(&draft.description))
        .unwrap_or_default();

    let questions_html: String = prefill
        .map(|draft| {
            draft
                .questions
                .iter()
                .enumerate()
                .map(|(qi, question)| {
                    let options: String = question
                        .answers
                        .iter()
                        .enumerate()
                        .map(|(ai, answer)| {
                            format!(
                                r#"<div class="option">
  <input type="text" name="q{qi}_a{ai}_text" value="{text}" placeholder="Answer text" required>
  <input type="number" name="q{qi}_a{ai}_value" value="{value}" step="any" min="0" placeholder="Value" required>
</div>"#,
                                text = escape_html(&answer.text),
                                value = answer.value,
                            )
                        })
                        .collect();
                    format!(
                        r#"<div class="question">
<div class="form-group">
  <label>Question</label>
  <input type="text" name="q{qi}_title" value="{title}" required>
</div>
{options}
<button type="button" class="btn add-answer">Add answer</button>
</div>"#,
                        title = escape_html(&question.title),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let body = format!(
        r#"<section class="panel">
<h2>{heading}</h2>
{error_html}
<form method="POST" action="{action}">
  <div class="form-group">
    <label for="name">Name</label>
    <input type="text" id="name" name="name" value="{name}" required autofocus>
  </div>
  <div class="form-group">
    <label for="description">Description</label>
    <input type="text" id="description" name="description" value="{description}">
  </div>
  <div id="questions">{questions_html}</div>
  <div class="form-group">
    <button type="button" id="add-question" class="btn">Add question</button>
  </div>
  <button type="submit" class="btn btn-primary">Save exercise</button>
  <a class="btn" href="/">Cancel</a>
</form>
<script src="/assets/quizbuilder.js" defer></script>
</section>"#
    );

    layout(heading, Some(user), &body)
}

fn render_take_page(user: &RequestIdentity, exercise: &Exercise) -> String {
    let questions_html: String = exercise
        .questions
        .iter()
        .enumerate()
        .map(|(qi, question)| {
            let choices: String = question
                .answers
                .iter()
                .map(|answer| {
                    format!(
                        r#"<label class="choice"><input type="radio" name="question_{qi}" value="{value}"> {text}</label>"#,
                        value = answer.value,
                        text = escape_html(&answer.text),
                    )
                })
                .collect();
            format!(
                r#"<div class="question"><h3>{}. {}</h3>{choices}</div>"#,
                qi + 1,
                escape_html(&question.title),
            )
        })
        .collect();

    let body = format!(
        r#"<section class="panel">
<h2>{name}</h2>
<p class="muted">{description}</p>
<form method="POST" action="/exercises/{id}/result">
{questions_html}
<button type="submit" class="btn btn-primary">Submit answers</button>
<a class="btn" href="/">Cancel</a>
</form>
</section>"#,
        id = exercise.id,
        name = escape_html(&exercise.name),
        description = escape_html(&exercise.description),
    );

    layout(&exercise.name, Some(user), &body)
}

fn render_result_page(
    user: &RequestIdentity,
    exercise: &Exercise,
    scores: &[QuestionScore],
) -> String {
    let correct = scores.iter().filter(|s| s.is_correct).count();
    let overall = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| s.percent).sum::<f64>() / scores.len() as f64
    };

    let rows: String = scores
        .iter()
        .map(|s| {
            let status = if s.is_correct {
                r#"<span class="ok">Correct</span>"#.to_string()
            } else if s.is_partial {
                format!(r#"<span class="partial">Partial ({:.0}%)</span>"#, s.percent * 100.0)
            } else {
                r#"<span class="miss">Incorrect</span>"#.to_string()
            };
            format!(
                "<tr><td>{title}</td><td>{selected}</td><td>{correct}</td><td>{status}</td></tr>",
                title = escape_html(&s.title),
                selected = escape_html(&s.selected_text),
                correct = escape_html(&s.correct_text),
            )
        })
        .collect();

    let body = format!(
        r#"<section class="panel">
<h2>Results: {name}</h2>
<p>{correct} of {total} correct &middot; overall {overall:.0}%</p>
<table class="results">
<tr><th>Question</th><th>Your answer</th><th>Correct answer</th><th>Outcome</th></tr>
{rows}
</table>
<p style="margin-top:14px">
  <a class="btn" href="/exercises/{id}">Take again</a>
  <a class="btn" href="/">Back to your desk</a>
</p>
</section>"#,
        id = exercise.id,
        name = escape_html(&exercise.name),
        total = scores.len(),
        overall = overall * 100.0,
    );

    layout("Results", Some(user), &body)
}
