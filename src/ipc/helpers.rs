use chrono::NaiveDate;
use serde_json::json;

use super::error::HandlerErr;
use super::types::AppState;
use crate::model::{SelectionKey, Student};
use crate::roster::RosterResolver;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Ids are accepted as numbers or numeric strings; null and absent mean unset.
pub fn get_optional_id(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_required_id(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    get_optional_id(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_params",
        message: format!("{} must be YYYY-MM-DD", key),
        details: Some(json!({ key: raw })),
    })
}

pub fn parse_selection_key(params: &serde_json::Value) -> Result<SelectionKey, HandlerErr> {
    Ok(SelectionKey {
        date: get_date(params, "date")?,
        class_id: get_optional_id(params, "classId")?,
        subject_id: get_optional_id(params, "subjectId")?,
        period: get_required_str(params, "period")?,
    })
}

pub fn require_resolver(state: &AppState) -> Result<RosterResolver, HandlerErr> {
    state
        .resolver()
        .ok_or_else(|| HandlerErr::new("no_session", "open a session first"))
}

pub fn selection_json(state: &AppState, key: &SelectionKey) -> serde_json::Value {
    json!({
        "date": key.date_param(),
        "classId": key.class_id,
        "subjectId": key.subject_id,
        "period": key.period,
        "isBreak": state.config.period(&key.period).map(|p| p.is_break).unwrap_or(false),
    })
}

pub fn students_json(students: &[Student]) -> serde_json::Value {
    serde_json::Value::Array(
        students
            .iter()
            .map(|s| {
                json!({
                    "email": s.email,
                    "fullname": s.fullname,
                    "classId": s.class_id,
                    "profilePicture": s.profile_picture,
                })
            })
            .collect(),
    )
}
