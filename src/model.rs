use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }

    /// Accepts the server's spellings as well as the single-letter codes the
    /// UI uses for quick entry.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" | "p" => Some(AttendanceStatus::Present),
            "absent" | "a" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

/// The single authoritative value for a student under the active selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReconciledStatus {
    Present,
    Absent,
    NotMarked,
}

impl ReconciledStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconciledStatus::Present => "Present",
            ReconciledStatus::Absent => "Absent",
            ReconciledStatus::NotMarked => "NotMarked",
        }
    }
}

impl From<Option<AttendanceStatus>> for ReconciledStatus {
    fn from(v: Option<AttendanceStatus>) -> Self {
        match v {
            Some(AttendanceStatus::Present) => ReconciledStatus::Present,
            Some(AttendanceStatus::Absent) => ReconciledStatus::Absent,
            None => ReconciledStatus::NotMarked,
        }
    }
}

impl From<AttendanceStatus> for ReconciledStatus {
    fn from(v: AttendanceStatus) -> Self {
        ReconciledStatus::from(Some(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub email: String,
    pub fullname: String,
    pub class_id: i64,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSection {
    pub id: i64,
    pub class_name: String,
    #[serde(default)]
    pub section: String,
}

/// Wire shape of a `/timetable/` row. Extra columns (day, period, room) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimetableEntry {
    pub teacher: String,
    pub class_id: i64,
    pub subject: i64,
    #[serde(default)]
    pub subject_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectAssignment {
    pub class_id: i64,
    pub subject_id: i64,
    pub subject_name: String,
    pub teacher_email: String,
}

/// The (date, class, subject, period) coordinate being edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SelectionKey {
    pub date: NaiveDate,
    pub class_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub period: String,
}

impl SelectionKey {
    pub fn is_complete(&self) -> bool {
        self.class_id.is_some() && self.subject_id.is_some()
    }

    pub fn date_param(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedAttendanceRecord {
    pub student_email: String,
    pub date: NaiveDate,
    pub class_id: i64,
    pub subject_id: i64,
    pub period: String,
    pub status: AttendanceStatus,
    pub created_time: Option<DateTime<Utc>>,
}

impl PersistedAttendanceRecord {
    pub fn matches(&self, key: &SelectionKey) -> bool {
        self.date == key.date
            && Some(self.class_id) == key.class_id
            && Some(self.subject_id) == key.subject_id
            && self.period == key.period
    }
}

/// A teacher's own check-in/out row from `/attendance/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherAttendanceRecord {
    pub teacher_email: String,
    pub date: NaiveDate,
    pub check_in: Option<NaiveTime>,
    pub check_out: Option<NaiveTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub present: usize,
    pub absent: usize,
}

impl AttendanceStats {
    /// Moves one student from `previous` to `next`.
    pub fn shift(&mut self, previous: ReconciledStatus, next: ReconciledStatus) {
        self.remove(previous);
        self.add(next);
    }

    pub fn add(&mut self, status: ReconciledStatus) {
        match status {
            ReconciledStatus::Present => self.present += 1,
            ReconciledStatus::Absent => self.absent += 1,
            ReconciledStatus::NotMarked => {}
        }
    }

    fn remove(&mut self, status: ReconciledStatus) {
        match status {
            ReconciledStatus::Present => self.present = self.present.saturating_sub(1),
            ReconciledStatus::Absent => self.absent = self.absent.saturating_sub(1),
            ReconciledStatus::NotMarked => {}
        }
    }
}

/// Display labels copied into every write item so consumers need no joins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionLabels {
    pub class_name: String,
    pub section: String,
    pub subject_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceWriteItem {
    pub student: String,
    pub teacher: String,
    pub class_id: i64,
    pub date: String,
    pub status: String,
    pub subject: i64,
    pub period: String,
    pub student_name: String,
    pub class_name: String,
    pub section: String,
    pub subject_name: String,
    pub created_time: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkItemError {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub errors: serde_json::Value,
}

impl BulkItemError {
    pub fn student(&self) -> Option<&str> {
        self.data.get("student").and_then(|v| v.as_str())
    }

    pub fn describe(&self) -> String {
        let detail = match &self.errors {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "rejected".to_string(),
            other => other.to_string(),
        };
        match self.student() {
            Some(student) => format!("{}: {}", student, detail),
            None => detail,
        }
    }
}

/// Structured body of `POST /student_attendance/bulk_create/`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub created_count: Option<usize>,
    #[serde(default)]
    pub errors: Vec<BulkItemError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkReply {
    pub status: u16,
    pub body: Option<BulkResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSlot {
    pub label: String,
    #[serde(default, rename = "isBreak")]
    pub is_break: bool,
}
