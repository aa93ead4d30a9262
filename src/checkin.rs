use crate::api::{ApiError, SchoolApi};
use crate::model::TeacherAttendanceRecord;
use crate::roster::Session;
use chrono::{NaiveDate, NaiveTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInState {
    NotCheckedIn,
    CheckedIn,
    CheckedOut,
}

impl CheckInState {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckInState::NotCheckedIn => "NotCheckedIn",
            CheckInState::CheckedIn => "CheckedIn",
            CheckInState::CheckedOut => "CheckedOut",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherDay {
    pub date: NaiveDate,
    pub state: CheckInState,
    pub check_in: Option<NaiveTime>,
    pub check_out: Option<NaiveTime>,
}

/// Collapses the teacher's rows for `date` into one day: earliest check-in,
/// latest check-out.
pub fn resolve_day(
    records: &[TeacherAttendanceRecord],
    session: &Session,
    date: NaiveDate,
) -> TeacherDay {
    let mine = records
        .iter()
        .filter(|r| r.date == date && session.is_teacher(&r.teacher_email));
    let mut check_in: Option<NaiveTime> = None;
    let mut check_out: Option<NaiveTime> = None;
    for r in mine {
        check_in = match (check_in, r.check_in) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        check_out = match (check_out, r.check_out) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
    let state = match (check_in, check_out) {
        (_, Some(_)) => CheckInState::CheckedOut,
        (Some(_), None) => CheckInState::CheckedIn,
        (None, None) => CheckInState::NotCheckedIn,
    };
    TeacherDay {
        date,
        state,
        check_in,
        check_out,
    }
}

pub fn load_day(
    api: &dyn SchoolApi,
    session: &Session,
    date: NaiveDate,
) -> Result<TeacherDay, ApiError> {
    let records = api.teacher_attendance(date)?;
    Ok(resolve_day(&records, session, date))
}
