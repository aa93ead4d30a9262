use crate::api::ApiError;
use crate::model::{PersistedAttendanceRecord, ReconciledStatus, SelectionKey, Student};
use crate::reconcile::{derive_status, fetch_snapshot, persisted_lookup, PendingEdits};
use crate::roster::RosterResolver;

/// Read-only view of one past (date, class, subject, period).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryDetails {
    pub key: SelectionKey,
    pub present: Vec<Student>,
    pub absent: Vec<Student>,
    pub not_marked: Vec<Student>,
}

pub fn partition(
    key: &SelectionKey,
    roster: Vec<Student>,
    records: &[PersistedAttendanceRecord],
) -> HistoryDetails {
    let persisted = persisted_lookup(key, records);
    let no_edits = PendingEdits::new();
    let mut details = HistoryDetails {
        key: key.clone(),
        present: Vec::new(),
        absent: Vec::new(),
        not_marked: Vec::new(),
    };
    for s in roster {
        match derive_status(&s.email, &no_edits, &persisted) {
            ReconciledStatus::Present => details.present.push(s),
            ReconciledStatus::Absent => details.absent.push(s),
            ReconciledStatus::NotMarked => details.not_marked.push(s),
        }
    }
    details
}

/// Fresh fetch and partition. Never sees the live session.
pub fn load_details_for_date(
    resolver: &RosterResolver,
    key: &SelectionKey,
) -> Result<HistoryDetails, ApiError> {
    let snapshot = fetch_snapshot(resolver, key)?;
    Ok(partition(key, snapshot.roster, &snapshot.records))
}
