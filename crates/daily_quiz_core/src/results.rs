//! crates/daily_quiz_core/src/results.rs
//!
//! The results aggregator: pure derivations over the submission result, today's
//! results payload and the ranking / score-distribution snapshots.

use std::f64::consts::PI;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{QuizResult, RankingEntry, ScoreDistribution, TodayResults};
use crate::normalize::{as_number, extract_list, first_f64, payload_object};

/// Points sampled along the density curve.
pub const DENSITY_RESOLUTION: usize = 64;

impl QuizResult {
    /// Reads the submission response, defaulting missing counters to zero and
    /// the question total to the number of questions answered.
    pub fn from_submission(body: &Value, question_count: usize) -> Self {
        let correct_count = first_f64(body, &["correctCount", "correct_count"])
            .map_or(0, |n| n.max(0.0) as u32);
        let total_questions = first_f64(body, &["totalQuestions", "total_questions"])
            .map_or(question_count as u32, |n| n.max(0.0) as u32);
        let percentage = first_f64(body, &["percentage", "accuracy"])
            .unwrap_or_else(|| accuracy(correct_count, total_questions) as f64);
        Self {
            correct_count,
            total_questions,
            percentage,
            score: first_f64(body, &["score"]).unwrap_or(0.0),
            total_time: first_f64(body, &["totalTime", "total_time"])
                .map_or(0, |n| n.max(0.0) as u64),
        }
    }
}

/// `round(correct / total * 100)`, 0 for an empty quiz.
pub fn accuracy(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(correct) / f64::from(total) * 100.0).round() as u32
}

/// Parses today's results from any of the tolerated envelopes.
pub fn parse_today_results(body: &Value) -> TodayResults {
    payload_object(body)
        .map(TodayResults::from_json)
        .unwrap_or_default()
}

/// Parses the ranking snapshot, skipping rows that cannot be read.
pub fn parse_ranking(body: &Value) -> Vec<RankingEntry> {
    extract_list(body, &["ranking", "data", "items", "entries"])
        .map(|rows| {
            rows.iter()
                .filter_map(RankingEntry::from_json)
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_distribution(body: &Value) -> ScoreDistribution {
    payload_object(body)
        .map(ScoreDistribution::from_json)
        .unwrap_or_default()
}

/// Coerces a percentile for display. `"45,5"` reads as 45.5; the result is
/// clamped to `[0, 100]`. Missing or non-numeric input is unavailable, never 0.
pub fn coerce_percentile(value: &Value) -> Option<f64> {
    as_number(value).map(|raw| raw.clamp(0.0, 100.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensityPoint {
    pub x: f64,
    pub y: f64,
}

/// Gaussian kernel density estimate for the distribution chart.
///
/// Bandwidth is a tenth of the score span (at least 1); the curve covers the
/// span widened by one bandwidth on each side. Fewer than two samples give an
/// empty curve.
pub fn kernel_density(scores: &[f64], resolution: usize) -> Vec<DensityPoint> {
    let samples: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    if samples.len() < 2 || resolution < 2 {
        return Vec::new();
    }

    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(*s), hi.max(*s))
        });
    let bandwidth = ((max - min) / 10.0).max(1.0);
    let (start, end) = (min - bandwidth, max + bandwidth);
    let step = (end - start) / (resolution - 1) as f64;
    let norm = 1.0 / (samples.len() as f64 * bandwidth * (2.0 * PI).sqrt());

    (0..resolution)
        .map(|i| {
            let x = start + step * i as f64;
            let y = samples
                .iter()
                .map(|s| {
                    let u = (x - s) / bandwidth;
                    (-0.5 * u * u).exp()
                })
                .sum::<f64>()
                * norm;
            DensityPoint { x, y }
        })
        .collect()
}

/// The server's z-score if given, otherwise `(score - mean) / std_dev` with the
/// moments taken from the snapshot or computed from its scores.
pub fn z_score(distribution: &ScoreDistribution, score: f64) -> Option<f64> {
    if let Some(z) = distribution.z_score.filter(|z| z.is_finite()) {
        return Some(z);
    }
    let n = distribution.scores.len() as f64;
    let mean = distribution
        .mean
        .or_else(|| (n > 0.0).then(|| distribution.scores.iter().sum::<f64>() / n))?;
    let std_dev = distribution.std_dev.or_else(|| {
        (n > 1.0).then(|| {
            let variance = distribution
                .scores
                .iter()
                .map(|s| (s - mean).powi(2))
                .sum::<f64>()
                / n;
            variance.sqrt()
        })
    })?;
    let z = (score - mean) / std_dev;
    (std_dev > 0.0 && z.is_finite()).then_some(z)
}

/// The figures shown for the quiz itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciled {
    pub correct_count: u32,
    pub total_questions: u32,
    pub accuracy: u32,
    pub score: f64,
    pub total_time: u64,
}

/// Today's payload wins field by field, then the immediate result, then
/// computed defaults.
pub fn reconcile(result: Option<&QuizResult>, today: Option<&TodayResults>) -> Reconciled {
    let correct_count = today
        .and_then(|t| t.correct_count)
        .or(result.map(|r| r.correct_count))
        .unwrap_or(0);
    let total_questions = today
        .and_then(|t| t.total_questions)
        .or(result.map(|r| r.total_questions))
        .unwrap_or(0);
    let accuracy = today
        .and_then(|t| t.percentage)
        .or(result.map(|r| r.percentage))
        .filter(|p| p.is_finite())
        .map(|p| p.round().clamp(0.0, 100.0) as u32)
        .unwrap_or_else(|| accuracy(correct_count, total_questions));

    Reconciled {
        correct_count,
        total_questions,
        accuracy,
        score: today
            .and_then(|t| t.score)
            .or(result.map(|r| r.score))
            .unwrap_or(0.0),
        total_time: today
            .and_then(|t| t.total_time)
            .or(result.map(|r| r.total_time))
            .unwrap_or(0),
    }
}

/// The caller's line in the ranking card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankRow {
    pub rank: Option<u32>,
    pub name: Option<String>,
    pub score: Option<f64>,
    /// Whether the row was found in the ranking snapshot.
    pub ranked: bool,
}

/// Finds the caller's row by user id, falling back to the values embedded in
/// today's payload.
pub fn caller_row(
    user_id: Option<&str>,
    ranking: &[RankingEntry],
    today: Option<&TodayResults>,
    fallback_score: f64,
) -> RankRow {
    let entry = user_id.and_then(|id| ranking.iter().find(|e| e.user_id == id));
    let today_rank = today.and_then(|t| t.rank);
    let today_name = today.and_then(|t| t.display_name.clone());
    let today_score = today.and_then(|t| t.score).or(Some(fallback_score));

    match entry {
        Some(entry) => RankRow {
            rank: entry.rank.or(today_rank),
            name: entry.display_name.clone().or(today_name),
            score: entry.score.or(today_score),
            ranked: true,
        },
        None => RankRow {
            rank: today_rank,
            name: today_name,
            score: today_score,
            ranked: false,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectBreakdown {
    pub subject: String,
    pub correct: u32,
    pub total: u32,
}

/// Correct/total per subject, in the order subjects first appear.
pub fn subject_breakdown(today: Option<&TodayResults>) -> Vec<SubjectBreakdown> {
    let mut breakdown: Vec<SubjectBreakdown> = Vec::new();
    for question in today.map(|t| t.questions.as_slice()).unwrap_or_default() {
        let subject = question
            .subject
            .clone()
            .unwrap_or_else(|| "General".to_string());
        let index = match breakdown.iter().position(|b| b.subject == subject) {
            Some(index) => index,
            None => {
                breakdown.push(SubjectBreakdown {
                    subject,
                    correct: 0,
                    total: 0,
                });
                breakdown.len() - 1
            }
        };
        breakdown[index].total += 1;
        if question.is_correct {
            breakdown[index].correct += 1;
        }
    }
    breakdown
}

/// Everything the results screen renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsView {
    pub summary: Reconciled,
    pub percentile: Option<f64>,
    pub z_score: Option<f64>,
    pub density: Vec<DensityPoint>,
    pub caller: RankRow,
    pub breakdown: Vec<SubjectBreakdown>,
    pub ranking: Vec<RankingEntry>,
}

/// Inputs gathered by the flow controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultsInputs<'a> {
    pub user_id: Option<&'a str>,
    pub result: Option<&'a QuizResult>,
    pub today: Option<&'a TodayResults>,
    pub ranking: Option<&'a [RankingEntry]>,
    pub distribution: Option<&'a ScoreDistribution>,
}

impl ResultsView {
    pub fn build(inputs: ResultsInputs<'_>) -> Self {
        let summary = reconcile(inputs.result, inputs.today);
        let ranking = inputs.ranking.unwrap_or_default();

        let percentile = inputs
            .distribution
            .and_then(|d| d.percentile.as_ref())
            .and_then(coerce_percentile)
            .or_else(|| {
                inputs
                    .today
                    .and_then(|t| t.percentile.as_ref())
                    .and_then(coerce_percentile)
            });
        let z_score = inputs.distribution.and_then(|d| {
            let score = d.user_score.unwrap_or(summary.score);
            z_score(d, score)
        });
        let density = inputs
            .distribution
            .map(|d| kernel_density(&d.scores, DENSITY_RESOLUTION))
            .unwrap_or_default();

        Self {
            caller: caller_row(inputs.user_id, ranking, inputs.today, summary.score),
            breakdown: subject_breakdown(inputs.today),
            ranking: ranking.to_vec(),
            summary,
            percentile,
            z_score,
            density,
        }
    }
}
