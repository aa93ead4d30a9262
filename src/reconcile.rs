use crate::api::ApiError;
use crate::model::{
    AttendanceStats, AttendanceStatus, PersistedAttendanceRecord, ReconciledStatus, SelectionKey,
    SelectionLabels, Student,
};
use crate::roster::RosterResolver;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Unsaved marks for the active selection, keyed by student email.
pub type PendingEdits = BTreeMap<String, AttendanceStatus>;

/// Persisted status per student for one selection.
pub type PersistedLookup = HashMap<String, AttendanceStatus>;

/// `pending ?? persisted ?? NotMarked`.
pub fn derive_status(
    email: &str,
    pending: &PendingEdits,
    persisted: &PersistedLookup,
) -> ReconciledStatus {
    pending
        .get(email)
        .or_else(|| persisted.get(email))
        .copied()
        .into()
}

pub fn derive_statuses(
    roster: &[Student],
    pending: &PendingEdits,
    persisted: &PersistedLookup,
) -> Vec<(String, ReconciledStatus)> {
    roster
        .iter()
        .map(|s| (s.email.clone(), derive_status(&s.email, pending, persisted)))
        .collect()
}

pub fn count_stats(
    roster: &[Student],
    pending: &PendingEdits,
    persisted: &PersistedLookup,
) -> AttendanceStats {
    let mut stats = AttendanceStats::default();
    for s in roster {
        stats.add(derive_status(&s.email, pending, persisted));
    }
    stats
}

/// Records that do not sit exactly on `key` are ignored. Duplicates for one
/// student resolve to the latest `created_time`.
pub fn persisted_lookup(
    key: &SelectionKey,
    records: &[PersistedAttendanceRecord],
) -> PersistedLookup {
    let mut latest: HashMap<&str, &PersistedAttendanceRecord> = HashMap::new();
    for rec in records.iter().filter(|r| r.matches(key)) {
        let newer = match latest.get(rec.student_email.as_str()) {
            Some(existing) => rec.created_time > existing.created_time,
            None => true,
        };
        if newer {
            latest.insert(rec.student_email.as_str(), rec);
        }
    }
    latest
        .into_iter()
        .map(|(email, rec)| (email.to_string(), rec.status))
        .collect()
}

/// Everything fetched for one selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionSnapshot {
    pub roster: Vec<Student>,
    pub records: Vec<PersistedAttendanceRecord>,
    pub labels: SelectionLabels,
}

/// Fetches roster, labels and persisted records for `key`. A key without a
/// class has nothing to fetch; a key without a subject has no records.
pub fn fetch_snapshot(
    resolver: &RosterResolver,
    key: &SelectionKey,
) -> Result<SelectionSnapshot, ApiError> {
    let Some(class_id) = key.class_id else {
        return Ok(SelectionSnapshot::default());
    };
    let roster = resolver.resolve_students(class_id)?;
    let labels = resolver.resolve_labels(key)?;
    let records = if key.subject_id.is_some() {
        resolver.api().list_student_attendance(key)?
    } else {
        Vec::new()
    };
    Ok(SelectionSnapshot {
        roster,
        records,
        labels,
    })
}

/// Identifies the selection a fetch was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub key: SelectionKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadApplied {
    Applied,
    Stale,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkApplied {
    pub previous: ReconciledStatus,
    pub current: ReconciledStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkRejected {
    NoSelection,
    UnknownStudent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub email: String,
    pub fullname: String,
    pub profile_picture: Option<String>,
    pub status: ReconciledStatus,
    pub pending: bool,
}

/// The live editing session for one selection at a time.
#[derive(Debug, Default)]
pub struct LiveSession {
    pub(crate) selection: Option<SelectionKey>,
    pub(crate) generation: u64,
    pub(crate) roster: Vec<Student>,
    pub(crate) roster_index: HashMap<String, usize>,
    pub(crate) labels: SelectionLabels,
    pub(crate) persisted: PersistedLookup,
    pub(crate) pending: PendingEdits,
    pub(crate) stats: AttendanceStats,
    pub(crate) loading: bool,
    pub(crate) load_error: Option<String>,
    pub(crate) in_flight: Option<uuid::Uuid>,
}

impl LiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Option<&SelectionKey> {
        self.selection.as_ref()
    }

    pub fn stats(&self) -> AttendanceStats {
        self.stats
    }

    pub fn pending(&self) -> &PendingEdits {
        &self.pending
    }

    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    pub fn labels(&self) -> &SelectionLabels {
        &self.labels
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Starts a new selection. Pending edits survive only when the key is
    /// unchanged (a reload).
    pub fn select(&mut self, key: SelectionKey) -> LoadTicket {
        if self.selection.as_ref() != Some(&key) {
            if !self.pending.is_empty() {
                debug!(dropped = self.pending.len(), "selection changed; pending edits cleared");
            }
            self.pending.clear();
        }
        self.generation += 1;
        self.selection = Some(key.clone());
        self.roster.clear();
        self.roster_index.clear();
        self.persisted.clear();
        self.labels = SelectionLabels::default();
        self.stats = AttendanceStats::default();
        self.loading = true;
        self.load_error = None;
        LoadTicket {
            generation: self.generation,
            key,
        }
    }

    /// Drops everything, e.g. when a different teacher signs in. A batch
    /// still on the wire keeps the submit guard until it lands.
    pub fn reset(&mut self) {
        let generation = self.generation;
        let in_flight = self.in_flight.take();
        *self = LiveSession::default();
        self.generation = generation + 1;
        self.in_flight = in_flight;
    }

    pub fn apply_load(
        &mut self,
        ticket: &LoadTicket,
        result: Result<SelectionSnapshot, ApiError>,
    ) -> LoadApplied {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale selection load"
            );
            return LoadApplied::Stale;
        }
        self.loading = false;

        let snapshot = match result {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "selection load failed");
                let message = e.to_string();
                self.load_error = Some(message.clone());
                return LoadApplied::Failed(message);
            }
        };

        self.roster_index = snapshot
            .roster
            .iter()
            .enumerate()
            .map(|(i, s)| (s.email.clone(), i))
            .collect();
        self.roster = snapshot.roster;
        self.labels = snapshot.labels;
        self.persisted = persisted_lookup(&ticket.key, &snapshot.records);
        let index = &self.roster_index;
        self.pending.retain(|email, _| index.contains_key(email));
        self.stats = count_stats(&self.roster, &self.pending, &self.persisted);

        info!(
            students = self.roster.len(),
            persisted = self.persisted.len(),
            present = self.stats.present,
            absent = self.stats.absent,
            "selection loaded"
        );
        LoadApplied::Applied
    }

    pub fn status_of(&self, email: &str) -> ReconciledStatus {
        derive_status(email, &self.pending, &self.persisted)
    }

    /// O(1) counter update: move the student out of its old bucket and into the new one.
    pub fn mark(
        &mut self,
        email: &str,
        status: AttendanceStatus,
    ) -> Result<MarkApplied, MarkRejected> {
        if self.selection.is_none() {
            return Err(MarkRejected::NoSelection);
        }
        if !self.roster_index.contains_key(email) {
            return Err(MarkRejected::UnknownStudent);
        }
        let previous = self.status_of(email);
        self.pending.insert(email.to_string(), status);
        let current = ReconciledStatus::from(status);
        self.stats.shift(previous, current);
        Ok(MarkApplied { previous, current })
    }

    /// Marks every roster student; returns how many statuses changed.
    pub fn mark_all(&mut self, status: AttendanceStatus) -> Result<usize, MarkRejected> {
        if self.selection.is_none() {
            return Err(MarkRejected::NoSelection);
        }
        let emails: Vec<String> = self.roster.iter().map(|s| s.email.clone()).collect();
        let mut changed = 0;
        for email in emails {
            let applied = self.mark(&email, status)?;
            if applied.previous != applied.current {
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn rows(&self) -> Vec<RowView> {
        let statuses = derive_statuses(&self.roster, &self.pending, &self.persisted);
        self.roster
            .iter()
            .zip(statuses)
            .map(|(s, (_, status))| RowView {
                email: s.email.clone(),
                fullname: s.fullname.clone(),
                profile_picture: s.profile_picture.clone(),
                status,
                pending: self.pending.contains_key(&s.email),
            })
            .collect()
    }
}
