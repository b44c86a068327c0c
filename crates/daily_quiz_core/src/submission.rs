//! crates/daily_quiz_core/src/submission.rs
//!
//! Builds the body of `POST /api/submit-answers`. The server expects 1-based
//! option numbers and one answer per question.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::SubmissionGuard;
use crate::session::QuizSession;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub selected_option: usize,
    pub time_spent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub session_id: Uuid,
    pub answers: Vec<AnswerRecord>,
}

/// Builds the payload for a finished session.
///
/// Fails, without touching the network, if a question is unanswered, if the
/// answer count differs from the question count, or if a question id repeats.
pub fn build_submission(session: &QuizSession) -> Result<SubmissionPayload, SubmissionGuard> {
    let answers = session
        .questions()
        .iter()
        .zip(session.selected_answers())
        .zip(session.time_spent_seconds())
        .enumerate()
        .map(|(index, ((question, selected), time_spent))| {
            let option = selected.ok_or(SubmissionGuard::Unanswered(index))?;
            Ok(AnswerRecord {
                question_id: question.id.clone(),
                selected_option: option + 1,
                time_spent: *time_spent,
            })
        })
        .collect::<Result<Vec<_>, SubmissionGuard>>()?;

    check_answers(&answers, session.questions().len()).map_err(|guard| {
        warn!("Refusing to submit session {}: {}", session.session_id(), guard);
        guard
    })?;

    Ok(SubmissionPayload {
        session_id: session.session_id(),
        answers,
    })
}

/// Length and duplicate-id checks on an already built answer list.
pub fn check_answers(answers: &[AnswerRecord], expected: usize) -> Result<(), SubmissionGuard> {
    if answers.len() != expected {
        return Err(SubmissionGuard::LengthMismatch {
            built: answers.len(),
            expected,
        });
    }
    let mut seen = HashSet::with_capacity(answers.len());
    for answer in answers {
        if !seen.insert(answer.question_id.as_str()) {
            return Err(SubmissionGuard::DuplicateQuestion(answer.question_id.clone()));
        }
    }
    Ok(())
}
