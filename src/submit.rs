use crate::api::ApiError;
use crate::model::{
    AttendanceStatus, AttendanceWriteItem, BulkReply, SelectionKey, SelectionLabels, Student,
};
use crate::reconcile::{LiveSession, PendingEdits};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

/// Why a submit request did nothing. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitBlocked {
    NoSelection,
    IncompleteSelection,
    InFlight,
    Loading,
    NothingPending,
}

impl SubmitBlocked {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitBlocked::NoSelection => "no_selection",
            SubmitBlocked::IncompleteSelection => "incomplete_selection",
            SubmitBlocked::InFlight => "in_flight",
            SubmitBlocked::Loading => "loading",
            SubmitBlocked::NothingPending => "nothing_pending",
        }
    }
}

/// One bulk write, with enough context to reconcile its result later.
#[derive(Debug, Clone)]
pub struct SubmitBatch {
    pub batch_id: Uuid,
    pub key: SelectionKey,
    pub submitted: Vec<(String, AttendanceStatus)>,
    pub items: Vec<AttendanceWriteItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success {
        created: usize,
    },
    Partial {
        created: usize,
        failed: usize,
        failed_indices: Vec<usize>,
        failed_students: Vec<String>,
        /// False when some error could not be tied to a batch item.
        fully_attributed: bool,
        first_error: Option<String>,
    },
    TransportFailure {
        message: String,
    },
}

impl SubmissionOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionOutcome::Success { .. } => "success",
            SubmissionOutcome::Partial { .. } => "partial",
            SubmissionOutcome::TransportFailure { .. } => "transport_failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub detail: Option<String>,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    pub batch_id: Uuid,
    pub outcome: SubmissionOutcome,
    /// False when the selection changed while the request was outstanding.
    pub applied: bool,
    pub notice: Notice,
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n, if n == 1 { one } else { many })
}

/// One denormalized item per pending edit, in email order.
pub fn build_write_items(
    key: &SelectionKey,
    labels: &SelectionLabels,
    roster: &[Student],
    pending: &PendingEdits,
    teacher: &str,
    now: DateTime<Utc>,
) -> Vec<AttendanceWriteItem> {
    let (Some(class_id), Some(subject_id)) = (key.class_id, key.subject_id) else {
        return Vec::new();
    };
    let names: HashMap<&str, &str> = roster
        .iter()
        .map(|s| (s.email.as_str(), s.fullname.as_str()))
        .collect();
    let created_time = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let date = key.date_param();

    pending
        .iter()
        .map(|(email, status)| AttendanceWriteItem {
            student: email.clone(),
            teacher: teacher.to_string(),
            class_id,
            date: date.clone(),
            status: status.as_str().to_string(),
            subject: subject_id,
            period: key.period.clone(),
            student_name: names.get(email.as_str()).copied().unwrap_or_default().to_string(),
            class_name: labels.class_name.clone(),
            section: labels.section.clone(),
            subject_name: labels.subject_name.clone(),
            created_time: created_time.clone(),
        })
        .collect()
}

/// Classifies the server's answer to a bulk write of `batch`.
pub fn interpret_bulk_result(
    batch: &SubmitBatch,
    result: Result<BulkReply, ApiError>,
) -> SubmissionOutcome {
    let item_count = batch.items.len();
    let reply = match result {
        Ok(v) => v,
        Err(e) => {
            return SubmissionOutcome::TransportFailure {
                message: e.to_string(),
            }
        }
    };
    let body = reply.body.unwrap_or_default();

    // Anything short of every item accepted is partial, whatever the flag says.
    let short = body.created_count.map_or(false, |c| c < item_count);
    let partial = reply.status == 207
        || short
        || body.success == Some(false)
        || !body.errors.is_empty();
    if !partial {
        return SubmissionOutcome::Success {
            created: body.created_count.unwrap_or(item_count),
        };
    }

    // Items the created count says did not land, errors or not.
    let unaccounted = body
        .created_count
        .map_or(0, |c| item_count.saturating_sub(c));
    let failed = if body.errors.is_empty() {
        item_count.saturating_sub(body.created_count.unwrap_or(0))
    } else {
        body.errors.len().max(unaccounted)
    };

    let mut failed_indices = Vec::new();
    let mut failed_students = Vec::new();
    let mut fully_attributed = !body.errors.is_empty() && unaccounted <= body.errors.len();
    for e in &body.errors {
        let by_index = e
            .index
            .filter(|i| *i < item_count)
            .map(|i| (i, batch.items[i].student.clone()));
        let by_student = || {
            e.student().and_then(|s| {
                batch
                    .items
                    .iter()
                    .position(|item| item.student == s)
                    .map(|i| (i, s.to_string()))
            })
        };
        match by_index.or_else(by_student) {
            Some((i, student)) => {
                failed_indices.push(i);
                failed_students.push(student);
            }
            None => fully_attributed = false,
        }
    }
    failed_indices.sort_unstable();
    failed_indices.dedup();
    failed_students.sort();
    failed_students.dedup();

    SubmissionOutcome::Partial {
        created: body
            .created_count
            .unwrap_or(item_count.saturating_sub(failed)),
        failed,
        failed_indices,
        failed_students,
        fully_attributed,
        first_error: body.errors.first().map(|e| e.describe()),
    }
}

fn notice_for(outcome: &SubmissionOutcome) -> Notice {
    match outcome {
        SubmissionOutcome::Success { created } => Notice {
            level: NoticeLevel::Success,
            message: format!(
                "Attendance saved for {}",
                plural(*created, "student", "students")
            ),
            detail: None,
            retryable: false,
        },
        SubmissionOutcome::Partial {
            failed,
            first_error,
            ..
        } => Notice {
            level: NoticeLevel::Warning,
            message: format!("{} had issues", plural(*failed, "record", "records")),
            detail: first_error.clone(),
            retryable: true,
        },
        SubmissionOutcome::TransportFailure { message } => Notice {
            level: NoticeLevel::Error,
            message: "Could not submit attendance; your marks are kept".to_string(),
            detail: Some(message.clone()),
            retryable: true,
        },
    }
}

impl LiveSession {
    /// `None` when the submit action should be enabled.
    pub fn submit_blocked(&self) -> Option<SubmitBlocked> {
        let Some(key) = self.selection.as_ref() else {
            return Some(SubmitBlocked::NoSelection);
        };
        if !key.is_complete() {
            Some(SubmitBlocked::IncompleteSelection)
        } else if self.in_flight.is_some() {
            Some(SubmitBlocked::InFlight)
        } else if self.loading {
            Some(SubmitBlocked::Loading)
        } else if self.pending.is_empty() {
            Some(SubmitBlocked::NothingPending)
        } else {
            None
        }
    }

    /// Takes a snapshot of the pending edits and marks a submission in flight.
    pub fn begin_submit(
        &mut self,
        teacher: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmitBatch, SubmitBlocked> {
        if let Some(blocked) = self.submit_blocked() {
            return Err(blocked);
        }
        let Some(key) = self.selection.clone() else {
            return Err(SubmitBlocked::NoSelection);
        };

        let items = build_write_items(
            &key,
            &self.labels,
            &self.roster,
            &self.pending,
            teacher,
            now,
        );
        let submitted: Vec<(String, AttendanceStatus)> = self
            .pending
            .iter()
            .map(|(email, status)| (email.clone(), *status))
            .collect();
        let batch_id = Uuid::new_v4();
        self.in_flight = Some(batch_id);
        info!(batch = %batch_id, items = items.len(), "submitting attendance");
        Ok(SubmitBatch {
            batch_id,
            key,
            submitted,
            items,
        })
    }

    /// Settles one submitted edit. `accepted` is folded into the persisted
    /// view; the pending edit is dropped unless it was changed after the batch
    /// was taken.
    fn settle(&mut self, email: &str, submitted: AttendanceStatus, accepted: bool) {
        let previous = self.status_of(email);
        if accepted {
            self.persisted.insert(email.to_string(), submitted);
        }
        if self.pending.get(email) == Some(&submitted) {
            self.pending.remove(email);
        }
        let current = self.status_of(email);
        if self.roster_index.contains_key(email) {
            self.stats.shift(previous, current);
        }
    }

    pub fn finish_submit(
        &mut self,
        batch: &SubmitBatch,
        outcome: SubmissionOutcome,
    ) -> SubmissionReport {
        if self.in_flight == Some(batch.batch_id) {
            self.in_flight = None;
        }
        let applied = self.selection.as_ref() == Some(&batch.key);

        if applied {
            match &outcome {
                SubmissionOutcome::Success { .. } => {
                    for (email, status) in &batch.submitted {
                        self.settle(email, *status, true);
                    }
                }
                SubmissionOutcome::Partial {
                    failed_students,
                    fully_attributed,
                    ..
                } => {
                    let failed: HashSet<&str> =
                        failed_students.iter().map(|s| s.as_str()).collect();
                    for (email, status) in &batch.submitted {
                        let accepted = *fully_attributed && !failed.contains(email.as_str());
                        self.settle(email, *status, accepted);
                    }
                }
                SubmissionOutcome::TransportFailure { .. } => {}
            }
        }

        match &outcome {
            SubmissionOutcome::Success { created } => {
                info!(batch = %batch.batch_id, created, applied, "attendance submitted")
            }
            SubmissionOutcome::Partial {
                created, failed, ..
            } => warn!(
                batch = %batch.batch_id,
                created,
                failed,
                applied,
                "attendance partially submitted"
            ),
            SubmissionOutcome::TransportFailure { message } => warn!(
                batch = %batch.batch_id,
                error = %message,
                "attendance submission failed; pending edits kept"
            ),
        }

        let notice = notice_for(&outcome);
        SubmissionReport {
            batch_id: batch.batch_id,
            outcome,
            applied,
            notice,
        }
    }
}
