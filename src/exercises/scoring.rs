//! Quiz answer scoring with partial credit.
//!
//! Pure module: no storage, no I/O. The correct option for a question is
//! the one with the highest value (first wins on ties); anything submitted
//! strictly between zero and that value earns partial credit proportional
//! to the ratio.

use super::{AnswerOption, Question};
use thiserror::Error;

/// Rendered in place of an option text when nothing usable was selected.
const NOT_SELECTED: &str = "N/A";

/// Score sheet for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionScore {
    pub title: String,
    pub selected_text: String,
    pub correct_text: String,
    pub is_correct: bool,
    pub is_partial: bool,
    pub percent: f64,
}

/// A quiz that cannot be scored. Surfaced to the quiz owner, not a crash.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("question {} has no answer options", index + 1)]
    NoOptions { index: usize },
    #[error("question {} has no option worth any points", index + 1)]
    NoPositiveValue { index: usize },
}

/// Score a submission against a quiz, one result per question in declared
/// order. Missing submissions still produce a row (zero credit, `N/A`).
///
/// Every question is validated before any is scored, so a misconfigured
/// quiz never yields a partial result sheet.
pub fn score(
    questions: &[Question],
    submitted: &[Option<f64>],
) -> Result<Vec<QuestionScore>, ScoringError> {
    let mut correct_options = Vec::with_capacity(questions.len());
    for (index, question) in questions.iter().enumerate() {
        let best =
            correct_option(&question.answers).ok_or(ScoringError::NoOptions { index })?;
        if best.value <= 0.0 {
            return Err(ScoringError::NoPositiveValue { index });
        }
        correct_options.push(best);
    }

    let results = questions
        .iter()
        .zip(correct_options)
        .enumerate()
        .map(|(index, (question, correct))| {
            let selection = submitted.get(index).copied().flatten();
            match selection {
                Some(value) => QuestionScore {
                    title: question.title.clone(),
                    selected_text: question
                        .answers
                        .iter()
                        .find(|option| option.value == value)
                        .map_or_else(|| NOT_SELECTED.to_string(), |option| option.text.clone()),
                    correct_text: correct.text.clone(),
                    is_correct: value == correct.value,
                    is_partial: value > 0.0 && value < correct.value,
                    percent: value / correct.value,
                },
                None => QuestionScore {
                    title: question.title.clone(),
                    selected_text: NOT_SELECTED.to_string(),
                    correct_text: correct.text.clone(),
                    is_correct: false,
                    is_partial: false,
                    percent: 0.0,
                },
            }
        })
        .collect();

    Ok(results)
}

/// Highest-valued option; the first one on ties.
fn correct_option(answers: &[AnswerOption]) -> Option<&AnswerOption> {
    answers.iter().reduce(|best, candidate| {
        if candidate.value > best.value {
            candidate
        } else {
            best
        }
    })
}
