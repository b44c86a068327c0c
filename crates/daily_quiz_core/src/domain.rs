//! crates/daily_quiz_core/src/domain.rs
//!
//! Defines the core data structures for the daily quiz client.
//! Payloads are read field by field and accept both camelCase and snake_case
//! names, since the remote API is not consistent about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{
    first_bool, first_f64, first_list, first_present, first_string, first_timestamp, first_u32,
    first_u64, lenient_string, scores_of,
};

/// The signed-in user as reported by the auth collaborator.
/// The token is read-only from the client's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub user_id: String,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The current user's profile, created server-side on signup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub avatar_id: Option<String>,
    pub medical_year: Option<u32>,
    pub mir_specialty: Option<String>,
    pub main_goal: Option<String>,
    pub university: Option<String>,
    pub profile_public: bool,
    pub onboarding_completed: bool,
    pub must_update_display_name: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Reads a profile object field by field. Only the id is required; a field
    /// of the wrong type reads as missing.
    pub fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            id: first_string(value, &["id", "userId", "user_id"])?,
            email: first_string(value, &["email"]),
            display_name: first_string(value, &["displayName", "display_name"]),
            username: first_string(value, &["username"]),
            avatar_id: first_string(value, &["avatarId", "avatar_id"]),
            medical_year: first_u32(value, &["medicalYear", "medical_year"]),
            mir_specialty: first_string(value, &["mirSpecialty", "mir_specialty"]),
            main_goal: first_string(value, &["mainGoal", "main_goal"]),
            university: first_string(value, &["university"]),
            profile_public: first_bool(value, &["profilePublic", "profile_public"])
                .unwrap_or(false),
            onboarding_completed: first_bool(value, &["onboardingCompleted", "onboarding_completed"])
                .unwrap_or(false),
            must_update_display_name: first_bool(
                value,
                &["mustUpdateDisplayName", "must_update_display_name"],
            )
            .unwrap_or(false),
            created_at: first_timestamp(value, &["createdAt", "created_at"]),
        })
    }
}

/// An entry of the universities / MIR specialties catalogs used by onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(alias = "label", alias = "nombre")]
    pub name: String,
}

/// One question of today's quiz, after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyQuestion {
    pub id: String,
    pub subject: Option<String>,
    pub statement: String,
    pub options: Vec<String>,
    pub correct_answer: Option<usize>,
    pub explanation: Option<String>,
}

/// Immediate feedback returned by the submission endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizResult {
    pub correct_count: u32,
    pub total_questions: u32,
    pub percentage: f64,
    pub score: f64,
    pub total_time: u64,
}

/// A per-question line of today's results payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredQuestion {
    pub question_id: Option<String>,
    pub subject: Option<String>,
    pub is_correct: bool,
}

impl AnsweredQuestion {
    pub fn from_json(value: &Value) -> Self {
        Self {
            question_id: first_string(value, &["questionId", "question_id", "id"]),
            subject: first_string(value, &["subject", "category"]),
            is_correct: first_bool(value, &["isCorrect", "is_correct", "correct"]).unwrap_or(false),
        }
    }
}

/// The richer "today's results" payload. Every field is optional; the results
/// aggregator falls back to the immediate `QuizResult` when one is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodayResults {
    pub correct_count: Option<u32>,
    pub total_questions: Option<u32>,
    pub percentage: Option<f64>,
    pub score: Option<f64>,
    pub total_time: Option<u64>,
    pub rank: Option<u32>,
    pub display_name: Option<String>,
    pub percentile: Option<Value>,
    pub questions: Vec<AnsweredQuestion>,
}

impl TodayResults {
    /// Reads the payload field by field, so one unreadable field never hides
    /// the others.
    pub fn from_json(value: &Value) -> Self {
        Self {
            correct_count: first_u32(
                value,
                &["correctCount", "correct_count", "correctAnswers", "correct_answers"],
            ),
            total_questions: first_u32(value, &["totalQuestions", "total_questions"]),
            percentage: first_f64(value, &["percentage", "accuracy"]),
            score: first_f64(value, &["score"]),
            total_time: first_u64(
                value,
                &["totalTime", "total_time", "timeSpent", "time_spent"],
            ),
            rank: first_u32(value, &["rank", "position"]),
            display_name: first_string(value, &["displayName", "display_name", "username"]),
            percentile: first_present(value, &["percentile"]).cloned(),
            questions: first_list(value, &["questions", "answers", "results"])
                .map(|rows| rows.iter().map(AnsweredQuestion::from_json).collect())
                .unwrap_or_default(),
        }
    }

    /// Whether the payload carries an actual result rather than an empty status.
    pub fn has_result(&self) -> bool {
        self.correct_count.is_some()
            || self.total_questions.is_some()
            || self.percentage.is_some()
            || self.score.is_some()
    }
}

/// A row of the daily ranking snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub user_id: String,
    pub rank: Option<u32>,
    pub display_name: Option<String>,
    pub score: Option<f64>,
}

impl RankingEntry {
    /// `None` for rows without a user id.
    pub fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            user_id: first_string(value, &["userId", "user_id", "id"])?,
            rank: first_u32(value, &["rank", "position"]),
            display_name: first_string(
                value,
                &["displayName", "display_name", "username", "name"],
            ),
            score: first_f64(value, &["score"]),
        })
    }
}

/// Today's score distribution snapshot across all users.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreDistribution {
    pub scores: Vec<f64>,
    pub percentile: Option<Value>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub user_score: Option<f64>,
    pub z_score: Option<f64>,
}

impl ScoreDistribution {
    pub fn from_json(value: &Value) -> Self {
        Self {
            scores: first_list(value, &["scores", "distribution", "values"])
                .map(|items| scores_of(items))
                .unwrap_or_default(),
            percentile: first_present(value, &["percentile"]).cloned(),
            mean: first_f64(value, &["mean", "average"]),
            std_dev: first_f64(value, &["stdDev", "std_dev", "stddev"]),
            user_score: first_f64(value, &["userScore", "user_score"]),
            z_score: first_f64(value, &["zScore", "z_score"]),
        }
    }
}

/// An entry of the notification feed. `unread` is mutated optimistically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub kind: Option<String>,
    pub icon: Option<String>,
    pub unread: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub action_url: Option<String>,
}
