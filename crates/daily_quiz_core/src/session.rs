//! crates/daily_quiz_core/src/session.rs
//!
//! The in-memory quiz session and its reducer. Navigation is an explicit
//! transition that flushes the elapsed time of the question being left before
//! the index changes, so timing is driven by index changes and never by
//! network responses.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::DailyQuestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizAction {
    /// Selects an option (0-based) for the current question.
    Select(usize),
    Next,
    Previous,
    NavigateTo(usize),
    /// Flushes the current question's time ahead of a submission.
    BeginSubmit,
}

/// What a reducer step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved,
    Stayed,
    /// "Next" on the last question: the caller should submit.
    SubmitRequested,
}

/// A quiz in progress. `selected_answers`, `time_spent_seconds` and `questions`
/// always have the same length.
#[derive(Debug, Clone)]
pub struct QuizSession {
    session_id: Uuid,
    questions: Vec<DailyQuestion>,
    current_index: usize,
    selected_answers: Vec<Option<usize>>,
    time_spent_seconds: Vec<u64>,
    visit_started: Instant,
}

impl QuizSession {
    pub fn new(questions: Vec<DailyQuestion>, now: Instant) -> Self {
        let len = questions.len();
        Self {
            session_id: Uuid::new_v4(),
            questions,
            current_index: 0,
            selected_answers: vec![None; len],
            time_spent_seconds: vec![0; len],
            visit_started: now,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn questions(&self) -> &[DailyQuestion] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&DailyQuestion> {
        self.questions.get(self.current_index)
    }

    pub fn selected_answers(&self) -> &[Option<usize>] {
        &self.selected_answers
    }

    pub fn time_spent_seconds(&self) -> &[u64] {
        &self.time_spent_seconds
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 >= self.questions.len()
    }

    /// Every question has a selected option.
    pub fn is_complete(&self) -> bool {
        self.selected_answers.iter().all(Option::is_some)
    }

    pub fn apply(&mut self, action: QuizAction, now: Instant) -> Transition {
        match action {
            QuizAction::Select(option) => {
                let valid = self
                    .current_question()
                    .is_some_and(|q| option < q.options.len());
                if valid {
                    self.selected_answers[self.current_index] = Some(option);
                }
                Transition::Stayed
            }
            QuizAction::Next if self.is_last() => {
                if self.is_complete() {
                    Transition::SubmitRequested
                } else {
                    Transition::Stayed
                }
            }
            QuizAction::Next => self.move_to(self.current_index + 1, now),
            QuizAction::Previous if self.current_index == 0 => Transition::Stayed,
            QuizAction::Previous => self.move_to(self.current_index - 1, now),
            QuizAction::NavigateTo(index) => self.move_to(index, now),
            QuizAction::BeginSubmit => {
                self.flush(now);
                Transition::Stayed
            }
        }
    }

    fn move_to(&mut self, index: usize, now: Instant) -> Transition {
        if index >= self.questions.len() || index == self.current_index {
            return Transition::Stayed;
        }
        self.flush(now);
        self.current_index = index;
        Transition::Moved
    }

    /// Adds the time since the current visit started to the current question.
    fn flush(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.visit_started);
        if let Some(slot) = self.time_spent_seconds.get_mut(self.current_index) {
            *slot += whole_seconds(elapsed);
        }
        self.visit_started = now;
    }
}

fn whole_seconds(elapsed: Duration) -> u64 {
    elapsed.as_secs_f64().round() as u64
}
