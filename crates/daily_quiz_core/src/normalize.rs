//! crates/daily_quiz_core/src/normalize.rs
//!
//! Tolerant JSON parsing. The remote API answers with several envelopes and
//! naming conventions for the same payload, so every payload goes through an
//! ordered list of extractors and the first one that succeeds wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::DailyQuestion;

type ListExtractor = fn(&Value) -> Option<&Vec<Value>>;
type ObjectExtractor = fn(&Value) -> Option<&Value>;

/// Envelopes accepted for question lists, in precedence order.
const QUESTION_LIST_EXTRACTORS: &[ListExtractor] = &[
    |v| v.as_array(),
    |v| v.get("questions")?.as_array(),
    |v| v.get("data")?.as_array(),
    |v| v.get("data")?.get("questions")?.as_array(),
    |v| v.get("items")?.as_array(),
    |v| v.get("daily_questions")?.as_array(),
    |v| v.get("dailyQuestions")?.as_array(),
];

/// Envelopes accepted for single-object payloads such as today's results.
const OBJECT_EXTRACTORS: &[ObjectExtractor] = &[
    |v| v.get("results").filter(|o| o.is_object()),
    |v| v.get("result").filter(|o| o.is_object()),
    |v| v.get("data").filter(|o| o.is_object()),
    |v| Some(v).filter(|o| o.is_object()),
];

/// Returns the first list found under `keys` (a bare array is always accepted first).
pub fn extract_list<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Some(items) = value.as_array() {
        return Some(items);
    }
    keys.iter().find_map(|key| value.get(*key)?.as_array())
}

/// Unwraps the question list from any of the tolerated envelopes.
pub fn question_list(value: &Value) -> Option<&Vec<Value>> {
    QUESTION_LIST_EXTRACTORS.iter().find_map(|extract| extract(value))
}

/// Unwraps a single payload object from `{results}`, `{result}`, `{data}` or a bare object.
pub fn payload_object(value: &Value) -> Option<&Value> {
    OBJECT_EXTRACTORS.iter().find_map(|extract| extract(value))
}

/// Normalizes a daily-questions response into `DailyQuestion`s.
///
/// Records without a non-empty id, a non-empty statement and at least two
/// options are dropped.
pub fn normalize_questions(value: &Value) -> Vec<DailyQuestion> {
    question_list(value)
        .map(|records| records.iter().filter_map(normalize_question).collect())
        .unwrap_or_default()
}

/// Normalizes a single question record, or `None` if it is unusable.
pub fn normalize_question(record: &Value) -> Option<DailyQuestion> {
    let id = first_string(record, &["id", "questionId", "question_id"])?;
    let statement = first_string(
        record,
        &["statement", "question", "questionText", "question_text", "text"],
    )?;
    let options = options_of(record);
    if options.len() < 2 {
        return None;
    }

    let correct_answer = ["correctAnswer", "correct_answer", "correctOption", "correct_option"]
        .iter()
        .find_map(|key| record.get(*key).and_then(as_index));

    Some(DailyQuestion {
        id,
        subject: first_string(record, &["subject", "category"]),
        statement,
        options,
        correct_answer,
        explanation: first_string(record, &["explanation"]),
    })
}

fn options_of(record: &Value) -> Vec<String> {
    if let Some(items) = record.get("options").and_then(Value::as_array) {
        return items.iter().filter_map(option_text).collect();
    }

    const DISCRETE: &[[&str; 4]] = &[
        ["option_a", "option_b", "option_c", "option_d"],
        ["optionA", "optionB", "optionC", "optionD"],
        ["option1", "option2", "option3", "option4"],
    ];
    DISCRETE
        .iter()
        .map(|keys| {
            keys.iter()
                .filter_map(|key| record.get(*key).and_then(option_text))
                .collect::<Vec<_>>()
        })
        .find(|options| !options.is_empty())
        .unwrap_or_default()
}

fn option_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(_) => first_string(value, &["text", "label", "value"])?,
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Server answer indices are 1-based; numbers and "B"-style letters are accepted.
fn as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().filter(|n| *n >= 1).map(|n| n as usize - 1),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<usize>() {
                return n.checked_sub(1);
            }
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => {
                    Some(c.to_ascii_lowercase() as usize - 'a' as usize)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// The first of `keys` holding a non-empty string (numbers are stringified).
pub fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| scalar_string(value.get(*key)?))
}

/// The first of `keys` holding a finite number. Numeric strings are accepted,
/// including `"45,5"` and `"87%"`.
pub fn first_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| as_number(value.get(*key)?))
}

/// Like `first_f64`, for non-negative counters. Fractions are rounded.
pub fn first_u32(value: &Value, keys: &[&str]) -> Option<u32> {
    first_u64(value, keys).map(|n| u32::try_from(n).unwrap_or(u32::MAX))
}

pub fn first_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| {
        as_number(value.get(*key)?)
            .filter(|n| *n >= 0.0)
            .map(|n| n.round() as u64)
    })
}

/// The first of `keys` holding a boolean (`"true"`/`"false"` strings included).
pub fn first_bool(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The first of `keys` present with a non-null value.
pub fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(*key).filter(|v| !v.is_null()))
}

/// The first of `keys` holding a list.
pub fn first_list<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| value.get(*key)?.as_array())
}

/// The first of `keys` holding an RFC 3339 timestamp.
pub fn first_timestamp(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| {
        let raw = value.get(*key)?.as_str()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|at| at.with_timezone(&Utc))
    })
}

/// Reads a number or a numeric string. Non-finite values are rejected.
pub fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Accepts `[12, 40.5]` as well as `[{"score": 12}, ...]`; unreadable items are skipped.
pub fn scores_of(items: &[Value]) -> Vec<f64> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(_) => first_f64(item, &["score", "value"]),
            other => as_number(other),
        })
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//=========================================================================================
// serde helpers
//=========================================================================================

pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    let value = Value::deserialize(de)?;
    scalar_string(&value).ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> Value {
        json!({ "id": id, "statement": "¿Qué?", "options": ["a", "b", "c", "d"] })
    }

    #[test]
    fn accepts_every_list_envelope() {
        let envelopes = [
            json!([record("1")]),
            json!({ "questions": [record("1")] }),
            json!({ "data": [record("1")] }),
            json!({ "data": { "questions": [record("1")] } }),
            json!({ "items": [record("1")] }),
            json!({ "daily_questions": [record("1")] }),
        ];
        for envelope in envelopes {
            let questions = normalize_questions(&envelope);
            assert_eq!(questions.len(), 1, "envelope {envelope}");
            assert_eq!(questions[0].id, "1");
        }
    }

    #[test]
    fn drops_records_that_are_not_usable() {
        let body = json!({ "questions": [
            record("keep"),
            { "id": "", "statement": "x", "options": ["a", "b"] },
            { "id": "no-statement", "options": ["a", "b"] },
            { "id": "one-option", "statement": "x", "options": ["a"] },
            { "id": "blank-options", "statement": "x", "options": ["", "  "] },
        ]});
        let questions = normalize_questions(&body);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "keep");
    }

    #[test]
    fn accepts_discrete_option_fields_and_snake_case() {
        let body = json!([{
            "question_id": 42,
            "question_text": "Fármaco de elección",
            "option_a": "A", "option_b": "B", "option_c": "C", "option_d": "D",
            "correct_answer": 3,
            "category": "Farmacología"
        }]);
        let question = &normalize_questions(&body)[0];
        assert_eq!(question.id, "42");
        assert_eq!(question.options, vec!["A", "B", "C", "D"]);
        assert_eq!(question.correct_answer, Some(2));
        assert_eq!(question.subject.as_deref(), Some("Farmacología"));
    }

    #[test]
    fn accepts_option_objects_and_letter_answers() {
        let body = json!({ "items": [{
            "id": "q", "question": "x",
            "options": [{ "text": "uno" }, { "label": "dos" }],
            "correctOption": "B"
        }]});
        let question = &normalize_questions(&body)[0];
        assert_eq!(question.options, vec!["uno", "dos"]);
        assert_eq!(question.correct_answer, Some(1));
    }

    #[test]
    fn non_json_bodies_produce_no_questions() {
        assert!(normalize_questions(&json!("No hay preguntas para hoy")).is_empty());
        assert!(normalize_questions(&Value::Null).is_empty());
        assert!(normalize_questions(&json!({ "error": "nope" })).is_empty());
    }

    #[test]
    fn payload_object_prefers_nested_results() {
        let body = json!({ "results": { "score": 1 }, "score": 2 });
        assert_eq!(payload_object(&body).and_then(|o| o.get("score")), Some(&json!(1)));
        let bare = json!({ "score": 2 });
        assert_eq!(payload_object(&bare).and_then(|o| o.get("score")), Some(&json!(2)));
    }
}
