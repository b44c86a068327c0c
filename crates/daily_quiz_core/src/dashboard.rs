//! crates/daily_quiz_core/src/dashboard.rs
//!
//! Read-only statistics shown on the dashboard. Only the most-failed-question
//! read goes through the retry policy; the rest are single attempts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::normalize::{extract_list, first_f64, first_u32, payload_object};
use crate::ports::ApiRequest;
use crate::retry::RetryPolicy;

pub const STATS_SUMMARY_PATH: &str = "/api/stats/summary";
pub const TIMESERIES_PATH: &str = "/api/stats/timeseries";
pub const HEATMAP_PATH: &str = "/api/stats/activity-heatmap";
pub const MOST_FAILED_WEEK_PATH: &str = "/api/stats/most-failed-week";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_quizzes: u32,
    pub average_score: f64,
    pub best_score: f64,
    pub average_accuracy: f64,
    pub current_streak: u32,
}

impl StatsSummary {
    /// Missing or unreadable figures read as zero.
    pub fn from_json(value: &Value) -> Self {
        Self {
            total_quizzes: first_u32(value, &["totalQuizzes", "total_quizzes", "quizzesCompleted"])
                .unwrap_or(0),
            average_score: first_f64(value, &["averageScore", "average_score"]).unwrap_or(0.0),
            best_score: first_f64(value, &["bestScore", "best_score"]).unwrap_or(0.0),
            average_accuracy: first_f64(
                value,
                &["averageAccuracy", "average_accuracy", "accuracy"],
            )
            .unwrap_or(0.0),
            current_streak: first_u32(value, &["currentStreak", "current_streak", "streak"])
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesPoint {
    #[serde(alias = "day")]
    pub date: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, alias = "percentage")]
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapDay {
    #[serde(alias = "day")]
    pub date: String,
    #[serde(default, alias = "value", alias = "quizzes")]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MostFailedQuestion {
    #[serde(alias = "question_id", alias = "id", deserialize_with = "crate::normalize::lenient_string")]
    pub question_id: String,
    #[serde(default, alias = "question", alias = "questionText")]
    pub statement: String,
    #[serde(default, alias = "category")]
    pub subject: Option<String>,
    #[serde(default, alias = "fail_rate", alias = "failure_rate", alias = "failRate")]
    pub failure_rate: f64,
    #[serde(default, alias = "fail_count", alias = "failures")]
    pub fail_count: u32,
}

/// One dashboard section: its data or the message to show next to a retry button.
pub type Section<T> = Result<T, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub summary: Section<StatsSummary>,
    pub timeseries: Section<Vec<TimeseriesPoint>>,
    pub heatmap: Section<Vec<HeatmapDay>>,
    pub most_failed: Section<Option<MostFailedQuestion>>,
}

pub struct Dashboard {
    api: ApiClient,
    retry: RetryPolicy,
    lifetime: CancellationToken,
}

impl Dashboard {
    pub fn new(api: ApiClient) -> Self {
        Self::with_retry(api, RetryPolicy::default())
    }

    pub fn with_retry(api: ApiClient, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            lifetime: CancellationToken::new(),
        }
    }

    pub fn teardown(&self) {
        self.lifetime.cancel();
    }

    pub async fn summary(&self) -> ClientResult<StatsSummary> {
        let body = self.get(STATS_SUMMARY_PATH).await?;
        Ok(payload_object(&body)
            .map(StatsSummary::from_json)
            .unwrap_or_default())
    }

    pub async fn timeseries(&self) -> ClientResult<Vec<TimeseriesPoint>> {
        let body = self.get(TIMESERIES_PATH).await?;
        Ok(parse_rows(&body, &["series", "points", "data", "items"]))
    }

    pub async fn heatmap(&self) -> ClientResult<Vec<HeatmapDay>> {
        let body = self.get(HEATMAP_PATH).await?;
        Ok(parse_rows(&body, &["days", "heatmap", "data", "items"]))
    }

    /// The week's most-failed question, retried on 5xx. `None` when the week
    /// has no data yet.
    pub async fn most_failed_week(&self) -> ClientResult<Option<MostFailedQuestion>> {
        let body = self.retry.run(|| self.get(MOST_FAILED_WEEK_PATH)).await?;
        let record = body
            .get("question")
            .filter(|q| q.is_object())
            .or_else(|| payload_object(&body));
        Ok(record.and_then(|record| serde_json::from_value(record.clone()).ok()))
    }

    /// Loads every section concurrently; a failed section does not hide the others.
    pub async fn load(&self) -> DashboardView {
        let (summary, timeseries, heatmap, most_failed) = tokio::join!(
            self.summary(),
            self.timeseries(),
            self.heatmap(),
            self.most_failed_week()
        );
        DashboardView {
            summary: section("summary", summary),
            timeseries: section("timeseries", timeseries),
            heatmap: section("heatmap", heatmap),
            most_failed: section("most-failed-week", most_failed),
        }
    }

    async fn get(&self, path: &str) -> ClientResult<Value> {
        let response = self
            .api
            .send_ok(ApiRequest::get(path), &self.lifetime.child_token())
            .await?;
        Ok(response.body)
    }
}

fn section<T>(name: &str, result: ClientResult<T>) -> Section<T> {
    result.map_err(|e| {
        if !matches!(e, ClientError::Aborted) {
            warn!("Dashboard {} failed: {}", name, e);
        }
        e.user_message()
    })
}

fn parse_rows<T: for<'de> Deserialize<'de>>(body: &Value, keys: &[&str]) -> Vec<T> {
    extract_list(body, keys)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| serde_json::from_value(row.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_with, ScriptedTransport};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn most_failed_week_retries_server_errors() {
        let transport = ScriptedTransport::new()
            .on(MOST_FAILED_WEEK_PATH, 503, json!({}))
            .on(MOST_FAILED_WEEK_PATH, 502, json!({}))
            .on(
                MOST_FAILED_WEEK_PATH,
                200,
                json!({ "question": { "id": 11, "question": "¿Causa más frecuente?", "failRate": 0.8 } }),
            );
        let (client, _) = client_with(transport.clone());
        let dashboard = Dashboard::new(client);

        let question = dashboard.most_failed_week().await.unwrap().unwrap();
        assert_eq!(question.question_id, "11");
        assert_eq!(question.failure_rate, 0.8);
        assert_eq!(transport.count(MOST_FAILED_WEEK_PATH), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn most_failed_week_gives_up_after_two_retries() {
        let transport = ScriptedTransport::new().on(MOST_FAILED_WEEK_PATH, 500, json!({}));
        let (client, _) = client_with(transport.clone());
        let dashboard = Dashboard::new(client);

        assert!(dashboard.most_failed_week().await.is_err());
        assert_eq!(transport.count(MOST_FAILED_WEEK_PATH), 3);
    }

    #[tokio::test]
    async fn other_reads_are_single_attempts() {
        let transport = ScriptedTransport::new()
            .on(STATS_SUMMARY_PATH, 500, json!({ "error": "caído" }))
            .on(TIMESERIES_PATH, 200, json!({ "series": [
                { "date": "2026-10-01", "score": 400, "percentage": 70 },
                { "score": 1 },
            ]}))
            .on(HEATMAP_PATH, 200, json!([{ "day": "2026-10-01", "count": 1 }]))
            .on(MOST_FAILED_WEEK_PATH, 404, json!({}));
        let (client, _) = client_with(transport.clone());
        let dashboard = Dashboard::new(client);

        let view = dashboard.load().await;
        assert_eq!(view.summary, Err("caído".to_string()));
        assert_eq!(view.timeseries.as_ref().map(Vec::len), Ok(1));
        assert_eq!(view.heatmap.as_ref().map(Vec::len), Ok(1));
        assert!(view.most_failed.is_err());
        assert_eq!(transport.count(STATS_SUMMARY_PATH), 1);
        assert_eq!(transport.count(MOST_FAILED_WEEK_PATH), 1);
    }

    #[tokio::test]
    async fn summary_tolerates_snake_case() {
        let transport = ScriptedTransport::new().on(
            STATS_SUMMARY_PATH,
            200,
            json!({ "data": { "total_quizzes": 12, "streak": 3, "accuracy": 71.5 } }),
        );
        let (client, _) = client_with(transport);
        let summary = Dashboard::new(client).summary().await.unwrap();
        assert_eq!(summary.total_quizzes, 12);
        assert_eq!(summary.current_streak, 3);
        assert_eq!(summary.average_accuracy, 71.5);
    }
}
