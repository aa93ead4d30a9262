use crate::config::Config;
use crate::model::{
    AttendanceStatus, AttendanceWriteItem, BulkReply, BulkResponse, ClassSection,
    PersistedAttendanceRecord, SelectionKey, Student, TeacherAttendanceRecord, TimetableEntry,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: u16,
        body: Option<String>,
    },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// The REST endpoints the attendance engine consumes.
pub trait SchoolApi: Send + Sync {
    fn list_students(&self) -> Result<Vec<Student>, ApiError>;
    fn list_classes(&self) -> Result<Vec<ClassSection>, ApiError>;
    fn list_timetable(&self) -> Result<Vec<TimetableEntry>, ApiError>;
    fn list_student_attendance(
        &self,
        key: &SelectionKey,
    ) -> Result<Vec<PersistedAttendanceRecord>, ApiError>;
    /// `Ok` whenever the server answered with a usable body, including HTTP
    /// errors that still carry a per-item `errors[]` list.
    fn bulk_create_attendance(&self, items: &[AttendanceWriteItem])
        -> Result<BulkReply, ApiError>;
    fn teacher_attendance(&self, date: NaiveDate)
        -> Result<Vec<TeacherAttendanceRecord>, ApiError>;
}

pub struct HttpApi {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpApi {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build();
        Self {
            base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get_rows(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>, ApiError> {
        let url = self.url(path);
        let mut req = self.agent.get(&url);
        for (k, v) in query {
            req = req.query(k, v);
        }
        debug!(%url, ?query, "GET");
        let resp = req.call().map_err(|e| map_ureq_error(&url, e))?;
        let text = resp.into_string().map_err(|e| ApiError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let body: Value = serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;
        rows_of(body).ok_or_else(|| ApiError::Decode {
            url,
            message: "expected a JSON array".to_string(),
        })
    }
}

fn map_ureq_error(url: &str, e: ureq::Error) -> ApiError {
    match e {
        ureq::Error::Status(status, resp) => ApiError::Status {
            url: url.to_string(),
            status,
            body: resp.into_string().ok().filter(|s| !s.trim().is_empty()),
        },
        ureq::Error::Transport(t) => ApiError::Transport {
            url: url.to_string(),
            message: t.to_string(),
        },
    }
}

/// Accepts a bare array or a paginated `{ "results": [...] }` envelope.
fn rows_of(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(rows) => Some(rows),
        Value::Object(mut obj) => match obj.remove("results") {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        },
        _ => None,
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, what: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(what, error = %e, "skipping undecodable row");
                None
            }
        })
        .collect()
}

fn parse_bulk_body(text: &str) -> Option<BulkResponse> {
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str::<BulkResponse>(text).ok()
}

impl SchoolApi for HttpApi {
    fn list_students(&self) -> Result<Vec<Student>, ApiError> {
        let rows = self.get_rows("students/", &[])?;
        Ok(decode_rows(rows, "student"))
    }

    fn list_classes(&self) -> Result<Vec<ClassSection>, ApiError> {
        let rows = self.get_rows("classes/", &[])?;
        Ok(decode_rows(rows, "class"))
    }

    fn list_timetable(&self) -> Result<Vec<TimetableEntry>, ApiError> {
        let rows = self.get_rows("timetable/", &[])?;
        Ok(decode_rows(rows, "timetable entry"))
    }

    fn list_student_attendance(
        &self,
        key: &SelectionKey,
    ) -> Result<Vec<PersistedAttendanceRecord>, ApiError> {
        let mut query = vec![("date", key.date_param())];
        if let Some(class_id) = key.class_id {
            query.push(("class_id", class_id.to_string()));
        }
        if let Some(subject_id) = key.subject_id {
            query.push(("subject", subject_id.to_string()));
        }
        query.push(("period", key.period.clone()));

        let rows = self.get_rows("student_attendance/", &query)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let rec = normalize_record(row);
                if rec.is_none() {
                    warn!(row = %row, "skipping attendance record without student/status");
                }
                rec
            })
            .collect())
    }

    fn bulk_create_attendance(
        &self,
        items: &[AttendanceWriteItem],
    ) -> Result<BulkReply, ApiError> {
        let url = self.url("student_attendance/bulk_create/");
        let payload = serde_json::to_string(items).map_err(|e| ApiError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;
        debug!(%url, items = items.len(), "POST");

        match self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&payload)
        {
            Ok(resp) => {
                let status = resp.status();
                let text = resp.into_string().unwrap_or_default();
                Ok(BulkReply {
                    status,
                    body: parse_bulk_body(&text),
                })
            }
            Err(ureq::Error::Status(status, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                match parse_bulk_body(&text) {
                    Some(body) if !body.errors.is_empty() => Ok(BulkReply {
                        status,
                        body: Some(body),
                    }),
                    _ => Err(ApiError::Status {
                        url,
                        status,
                        body: Some(text).filter(|s| !s.trim().is_empty()),
                    }),
                }
            }
            Err(ureq::Error::Transport(t)) => Err(ApiError::Transport {
                url,
                message: t.to_string(),
            }),
        }
    }

    fn teacher_attendance(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<TeacherAttendanceRecord>, ApiError> {
        let rows = self.get_rows(
            "attendance/",
            &[("date", date.format("%Y-%m-%d").to_string())],
        )?;
        Ok(rows.iter().filter_map(normalize_teacher_record).collect())
    }
}

fn str_field<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .filter_map(|v| v.as_str())
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
}

/// Ids arrive as numbers, numeric strings, or nested `{ "id": n }` objects.
fn id_field(row: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| row.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Object(_) => v.get("id").and_then(|id| id.as_i64()),
        _ => None,
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.time()))
}

/// Canonicalizes one `/student_attendance/` row. The student key has shipped
/// under several names over the server's lifetime.
pub fn normalize_record(row: &Value) -> Option<PersistedAttendanceRecord> {
    let student_email = str_field(row, &["student", "student_email", "user_email"])?;
    let status = str_field(row, &["status"]).and_then(AttendanceStatus::parse)?;
    let date = str_field(row, &["date"]).and_then(parse_date)?;
    Some(PersistedAttendanceRecord {
        student_email: student_email.to_string(),
        date,
        class_id: id_field(row, &["class_id", "class"])?,
        subject_id: id_field(row, &["subject", "subject_id"])?,
        period: str_field(row, &["period"]).unwrap_or_default().to_string(),
        status,
        created_time: str_field(row, &["created_time", "created_at"]).and_then(parse_timestamp),
    })
}

pub fn normalize_teacher_record(row: &Value) -> Option<TeacherAttendanceRecord> {
    let teacher_email = str_field(row, &["teacher", "user_email", "email"])?;
    let date = str_field(row, &["date"]).and_then(parse_date)?;
    Some(TeacherAttendanceRecord {
        teacher_email: teacher_email.to_string(),
        date,
        check_in: str_field(row, &["check_in", "check_in_time"]).and_then(parse_time),
        check_out: str_field(row, &["check_out", "check_out_time"]).and_then(parse_time),
    })
}
