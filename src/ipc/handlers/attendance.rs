use crate::api::ApiError;
use crate::ipc::error::{err, ok, respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, parse_selection_key, require_resolver, selection_json};
use crate::ipc::jobs::CompletionKind;
use crate::ipc::types::{AppState, Reply, Request};
use crate::model::{AttendanceStatus, BulkReply, SelectionKey};
use crate::reconcile::{fetch_snapshot, LoadApplied, LoadTicket, MarkRejected, SelectionSnapshot};
use crate::submit::{interpret_bulk_result, SubmissionOutcome, SubmissionReport, SubmitBatch};
use chrono::Utc;
use serde_json::json;

fn parse_status(params: &serde_json::Value) -> Result<AttendanceStatus, HandlerErr> {
    let raw = get_required_str(params, "status")?;
    AttendanceStatus::parse(&raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "status must be Present or Absent".to_string(),
        details: Some(json!({ "status": raw })),
    })
}

fn stats_json(state: &AppState) -> serde_json::Value {
    let stats = state.live.stats();
    let not_marked = state
        .live
        .roster()
        .len()
        .saturating_sub(stats.present + stats.absent);
    json!({
        "present": stats.present,
        "absent": stats.absent,
        "notMarked": not_marked,
    })
}

pub fn view_json(state: &AppState) -> serde_json::Value {
    let live = &state.live;
    let rows: Vec<serde_json::Value> = live
        .rows()
        .into_iter()
        .map(|r| {
            json!({
                "email": r.email,
                "fullname": r.fullname,
                "profilePicture": r.profile_picture,
                "status": r.status.as_str(),
                "pending": r.pending,
            })
        })
        .collect();
    let labels = live.labels();
    let blocked = live.submit_blocked();
    json!({
        "selection": live.selection().map(|k| selection_json(state, k)),
        "labels": {
            "className": labels.class_name,
            "section": labels.section,
            "subjectName": labels.subject_name,
        },
        "loading": live.is_loading(),
        "loadError": live.load_error(),
        "submitting": live.is_submitting(),
        "canSubmit": blocked.is_none(),
        "submitBlockedReason": blocked.map(|b| b.as_str()),
        "stats": stats_json(state),
        "pendingCount": live.pending().len(),
        "rows": rows,
    })
}

/// Clears the session for `key` and starts the fetch. Nothing to fetch
/// without a class, so that case completes inline.
fn start_selection(state: &mut AppState, req: &Request, key: SelectionKey) -> Reply {
    let resolver = match require_resolver(state) {
        Ok(v) => v,
        Err(e) => return Reply::Now(e.response(&req.id)),
    };
    let ticket = state.live.select(key.clone());
    if key.class_id.is_none() {
        let response = complete_selection(state, &req.id, ticket, Ok(SelectionSnapshot::default()));
        return Reply::Now(response);
    }
    state.jobs.spawn(&req.id, move || {
        let result = fetch_snapshot(&resolver, &ticket.key);
        CompletionKind::SelectionLoaded { ticket, result }
    });
    Reply::Deferred
}

fn handle_attendance_select(state: &mut AppState, req: &Request) -> Reply {
    match parse_selection_key(&req.params) {
        Ok(key) => start_selection(state, req, key),
        Err(e) => Reply::Now(e.response(&req.id)),
    }
}

fn handle_attendance_reload(state: &mut AppState, req: &Request) -> Reply {
    match state.live.selection().cloned() {
        Some(key) => start_selection(state, req, key),
        None => Reply::Now(err(&req.id, "no_selection", "select a class and period first", None)),
    }
}

pub fn complete_selection(
    state: &mut AppState,
    id: &str,
    ticket: LoadTicket,
    result: Result<SelectionSnapshot, ApiError>,
) -> serde_json::Value {
    let failure = result.as_ref().err().map(HandlerErr::fetch_failed);
    match state.live.apply_load(&ticket, result) {
        LoadApplied::Applied => ok(
            id,
            json!({ "applied": true, "stale": false, "view": view_json(state) }),
        ),
        LoadApplied::Stale => ok(
            id,
            json!({
                "applied": false,
                "stale": true,
                "selection": selection_json(state, &ticket.key),
            }),
        ),
        LoadApplied::Failed(message) => failure
            .unwrap_or_else(|| HandlerErr::new("fetch_failed", message))
            .response(id),
    }
}

fn attendance_mark(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "studentEmail")?;
    let status = parse_status(params)?;
    match state.live.mark(&email, status) {
        Ok(applied) => Ok(json!({
            "applied": true,
            "studentEmail": email,
            "previous": applied.previous.as_str(),
            "status": applied.current.as_str(),
            "stats": stats_json(state),
            "pendingCount": state.live.pending().len(),
        })),
        Err(MarkRejected::UnknownStudent) => Ok(json!({
            "applied": false,
            "reason": "unknown_student",
            "studentEmail": email,
            "stats": stats_json(state),
        })),
        Err(MarkRejected::NoSelection) => Err(HandlerErr::new(
            "no_selection",
            "select a class and period first",
        )),
    }
}

fn attendance_mark_all(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let status = parse_status(params)?;
    let changed = state
        .live
        .mark_all(status)
        .map_err(|_| HandlerErr::new("no_selection", "select a class and period first"))?;
    Ok(json!({
        "changed": changed,
        "stats": stats_json(state),
        "pendingCount": state.live.pending().len(),
    }))
}

fn handle_attendance_submit(state: &mut AppState, req: &Request) -> Reply {
    let resolver = match require_resolver(state) {
        Ok(v) => v,
        Err(e) => return Reply::Now(e.response(&req.id)),
    };
    let teacher = resolver.session().teacher_email.clone();
    let batch = match state.live.begin_submit(&teacher, Utc::now()) {
        Ok(v) => v,
        Err(blocked) => {
            return Reply::Now(ok(
                &req.id,
                json!({ "submitted": false, "reason": blocked.as_str() }),
            ))
        }
    };
    state.jobs.spawn(&req.id, move || {
        let result = resolver.api().bulk_create_attendance(&batch.items);
        CompletionKind::Submitted { batch, result }
    });
    Reply::Deferred
}

fn outcome_json(report: &SubmissionReport) -> serde_json::Value {
    let mut out = json!({ "kind": report.outcome.kind() });
    match &report.outcome {
        SubmissionOutcome::Success { created } => {
            out["created"] = json!(created);
            out["failed"] = json!(0);
        }
        SubmissionOutcome::Partial {
            created,
            failed,
            failed_indices,
            failed_students,
            first_error,
            ..
        } => {
            out["created"] = json!(created);
            out["failed"] = json!(failed);
            out["failedIndices"] = json!(failed_indices);
            out["failedStudents"] = json!(failed_students);
            out["firstError"] = json!(first_error);
        }
        SubmissionOutcome::TransportFailure { message } => {
            out["message"] = json!(message);
        }
    }
    out
}

pub fn complete_submit(
    state: &mut AppState,
    id: &str,
    batch: SubmitBatch,
    result: Result<BulkReply, ApiError>,
) -> serde_json::Value {
    let outcome = interpret_bulk_result(&batch, result);
    let report = state.live.finish_submit(&batch, outcome);
    ok(
        id,
        json!({
            "submitted": true,
            "batchId": report.batch_id.to_string(),
            "items": batch.items.len(),
            "applied": report.applied,
            "outcome": outcome_json(&report),
            "notice": {
                "level": report.notice.level.as_str(),
                "message": report.notice.message,
                "detail": report.notice.detail,
                "retryable": report.notice.retryable,
            },
            "view": view_json(state),
        }),
    )
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = attendance_mark(state, &req.params);
    respond(&req.id, result)
}

fn handle_attendance_mark_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = attendance_mark_all(state, &req.params);
    respond(&req.id, result)
}

fn handle_attendance_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, view_json(state))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Reply> {
    match req.method.as_str() {
        "attendance.select" => Some(handle_attendance_select(state, req)),
        "attendance.reload" => Some(handle_attendance_reload(state, req)),
        "attendance.mark" => Some(Reply::Now(handle_attendance_mark(state, req))),
        "attendance.markAll" => Some(Reply::Now(handle_attendance_mark_all(state, req))),
        "attendance.state" => Some(Reply::Now(handle_attendance_state(state, req))),
        "attendance.submit" => Some(handle_attendance_submit(state, req)),
        _ => None,
    }
}
