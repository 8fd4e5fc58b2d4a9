//! Quiz exercises: model, persistence, and form parsing.
//!
//! An exercise is an owner-scoped row whose questions live in a JSON `data`
//! column. The quiz-builder form posts flat indexed fields
//! (`q0_title`, `q0_a0_text`, `q0_a0_value`, ...) which [`parse_exercise_form`]
//! validates into a draft; submissions post `question_{i}` fields read by
//! [`parse_submission`].

pub mod scoring;

use crate::store::Store;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// One selectable answer. `value` is the score it is worth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub text: String,
    pub value: f64,
}

/// One question with its ordered options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub title: String,
    pub answers: Vec<AnswerOption>,
}

/// A stored exercise.
#[derive(Debug, Clone)]
pub struct Exercise {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub created_at: i64,
}

/// Validated creation/update payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseDraft {
    pub name: String,
    pub description: String,
    pub questions: Vec<Question>,
}

/// Parse the quiz-builder form into a draft, rejecting anything a taker
/// could not be scored on. Errors are user-facing.
pub fn parse_exercise_form(fields: &HashMap<String, String>) -> Result<ExerciseDraft> {
    let name = fields
        .get("name")
        .map(|v| v.trim().to_string())
        .unwrap_or_default();
    if name.is_empty() {
        bail!("Exercise name cannot be empty");
    }
    let description = fields
        .get("description")
        .map(|v| v.trim().to_string())
        .unwrap_or_default();

    let mut questions = Vec::new();
    let mut qi = 0usize;
    while let Some(title) = fields.get(&format!("q{qi}_title")) {
        let title = title.trim();
        if title.is_empty() {
            bail!("Question {} needs a title", qi + 1);
        }

        let mut answers = Vec::new();
        let mut ai = 0usize;
        while let Some(text) = fields.get(&format!("q{qi}_a{ai}_text")) {
            let text = text.trim();
            if text.is_empty() {
                bail!("Question {}: answer {} has no text", qi + 1, ai + 1);
            }
            let raw_value = fields
                .get(&format!("q{qi}_a{ai}_value"))
                .map(String::as_str)
                .unwrap_or("");
            let value: f64 = raw_value
                .trim()
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite() && *v >= 0.0)
                .with_context(|| {
                    format!(
                        "Question {}: answer {} needs a non-negative numeric value",
                        qi + 1,
                        ai + 1
                    )
                })?;
            answers.push(AnswerOption {
                text: text.to_string(),
                value,
            });
            ai += 1;
        }
        if answers.is_empty() {
            bail!("Question {} needs at least one answer", qi + 1);
        }

        questions.push(Question {
            title: title.to_string(),
            answers,
        });
        qi += 1;
    }
    if questions.is_empty() {
        bail!("An exercise needs at least one question");
    }

    Ok(ExerciseDraft {
        name,
        description,
        questions,
    })
}

/// Read the take-quiz form: one `question_{i}` field per answered question,
/// holding the selected option's value. Missing or malformed fields become
/// `None` (unanswered).
pub fn parse_submission(fields: &HashMap<String, String>, question_count: usize) -> Vec<Option<f64>> {
    (0..question_count)
        .map(|i| {
            fields
                .get(&format!("question_{i}"))
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        })
        .collect()
}

/// Exercise persistence over the shared database handle.
pub struct ExerciseStore {
    store: Store,
}

impl ExerciseStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert a new exercise for `owner`. Returns its id.
    pub fn create(&self, owner: &str, draft: &ExerciseDraft) -> Result<i64> {
        let data = serde_json::to_string(&draft.questions)?;
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT INTO exercises (owner, name, description, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![owner, draft.name, draft.description, data, epoch_secs()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one exercise. Rows belonging to another owner read as absent.
    pub fn get(&self, owner: &str, id: i64) -> Result<Option<Exercise>> {
        let conn = self.store.conn()?;
        let row: Result<(i64, String, String, String, String, i64), _> = conn.query_row(
            "SELECT id, owner, name, description, data, created_at
             FROM exercises WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        );

        match row {
            Ok((id, owner, name, description, data, created_at)) => {
                let questions = serde_json::from_str(&data)
                    .with_context(|| format!("exercise {id} has corrupt question data"))?;
                Ok(Some(Exercise {
                    id,
                    owner,
                    name,
                    description,
                    questions,
                    created_at,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All exercises for `owner`, newest first.
    pub fn list(&self, owner: &str) -> Result<Vec<Exercise>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, name, description, data, created_at
             FROM exercises WHERE owner = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![owner], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, owner, name, description, data, created_at)| {
                let questions = serde_json::from_str(&data)
                    .with_context(|| format!("exercise {id} has corrupt question data"))?;
                Ok(Exercise {
                    id,
                    owner,
                    name,
                    description,
                    questions,
                    created_at,
                })
            })
            .collect()
    }

    /// Replace name, description, and questions. Returns whether a row
    /// belonging to `owner` was updated.
    pub fn update(&self, owner: &str, id: i64, draft: &ExerciseDraft) -> Result<bool> {
        let data = serde_json::to_string(&draft.questions)?;
        let conn = self.store.conn()?;
        let changed = conn.execute(
            "UPDATE exercises SET name = ?1, description = ?2, data = ?3
             WHERE id = ?4 AND owner = ?5",
            rusqlite::params![draft.name, draft.description, data, id, owner],
        )?;
        Ok(changed > 0)
    }

    /// Delete an exercise. Returns whether a row was removed.
    pub fn delete(&self, owner: &str, id: i64) -> Result<bool> {
        let conn = self.store.conn()?;
        let deleted = conn.execute(
            "DELETE FROM exercises WHERE id = ?1 AND owner = ?2",
            rusqlite::params![id, owner],
        )?;
        Ok(deleted > 0)
    }
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, ExerciseStore) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("desk.db")).unwrap();
        store.migrate().unwrap();
        (tmp, ExerciseStore::new(store))
    }

    fn sample_draft() -> ExerciseDraft {
        ExerciseDraft {
            name: "Capitals".to_string(),
            description: "European capitals".to_string(),
            questions: vec![Question {
                title: "Capital of Portugal?".to_string(),
                answers: vec![
                    AnswerOption {
                        text: "Porto".to_string(),
                        value: 1.0,
                    },
                    AnswerOption {
                        text: "Lisbon".to_string(),
                        value: 3.0,
                    },
                ],
            }],
        }
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn create_and_get_roundtrip() {
        let (_tmp, exercises) = test_store();

        let id = exercises.create("ana", &sample_draft()).unwrap();
        let loaded = exercises.get("ana", id).unwrap().unwrap();
        assert_eq!(loaded.name, "Capitals");
        assert_eq!(loaded.questions, sample_draft().questions);
    }

    #[test]
    fn rows_are_owner_scoped() {
        let (_tmp, exercises) = test_store();

        let id = exercises.create("ana", &sample_draft()).unwrap();
        assert!(exercises.get("bruno", id).unwrap().is_none());
        assert!(!exercises.delete("bruno", id).unwrap());
        assert!(exercises.get("ana", id).unwrap().is_some());
    }

    #[test]
    fn list_returns_only_the_owners_rows() {
        let (_tmp, exercises) = test_store();

        exercises.create("ana", &sample_draft()).unwrap();
        exercises.create("ana", &sample_draft()).unwrap();
        exercises.create("bruno", &sample_draft()).unwrap();

        assert_eq!(exercises.list("ana").unwrap().len(), 2);
        assert_eq!(exercises.list("bruno").unwrap().len(), 1);
    }

    #[test]
    fn update_replaces_content() {
        let (_tmp, exercises) = test_store();

        let id = exercises.create("ana", &sample_draft()).unwrap();
        let mut draft = sample_draft();
        draft.name = "Renamed".to_string();
        assert!(exercises.update("ana", id, &draft).unwrap());

        let loaded = exercises.get("ana", id).unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
    }

    #[test]
    fn delete_removes_the_row() {
        let (_tmp, exercises) = test_store();

        let id = exercises.create("ana", &sample_draft()).unwrap();
        assert!(exercises.delete("ana", id).unwrap());
        assert!(exercises.get("ana", id).unwrap().is_none());
        assert!(!exercises.delete("ana", id).unwrap());
    }

    #[test]
    fn parse_form_builds_draft() {
        let fields = form(&[
            ("name", "Capitals"),
            ("description", ""),
            ("q0_title", "Capital of Portugal?"),
            ("q0_a0_text", "Porto"),
            ("q0_a0_value", "1"),
            ("q0_a1_text", "Lisbon"),
            ("q0_a1_value", "3"),
            ("q1_title", "Capital of Spain?"),
            ("q1_a0_text", "Madrid"),
            ("q1_a0_value", "2"),
        ]);

        let draft = parse_exercise_form(&fields).unwrap();
        assert_eq!(draft.name, "Capitals");
        assert_eq!(draft.questions.len(), 2);
        assert_eq!(draft.questions[0].answers[1].value, 3.0);
    }

    #[test]
    fn parse_form_rejects_missing_name() {
        let fields = form(&[
            ("name", "  "),
            ("q0_title", "Q"),
            ("q0_a0_text", "A"),
            ("q0_a0_value", "1"),
        ]);
        assert!(parse_exercise_form(&fields).is_err());
    }

    #[test]
    fn parse_form_rejects_question_without_answers() {
        let fields = form(&[("name", "Quiz"), ("q0_title", "Q")]);
        assert!(parse_exercise_form(&fields).is_err());
    }

    #[test]
    fn parse_form_rejects_bad_values() {
        for bad in ["", "abc", "-1", "NaN"] {
            let fields = form(&[
                ("name", "Quiz"),
                ("q0_title", "Q"),
                ("q0_a0_text", "A"),
                ("q0_a0_value", bad),
            ]);
            assert!(parse_exercise_form(&fields).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn parse_form_rejects_empty_quiz() {
        let fields = form(&[("name", "Quiz")]);
        assert!(parse_exercise_form(&fields).is_err());
    }

    #[test]
    fn parse_submission_reads_indexed_fields() {
        let fields = form(&[("question_0", "3"), ("question_2", "oops")]);
        let submitted = parse_submission(&fields, 3);
        assert_eq!(submitted, vec![Some(3.0), None, None]);
    }
}
