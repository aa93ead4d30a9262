use crate::history::{load_details_for_date, HistoryDetails};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{parse_selection_key, require_resolver, students_json};
use crate::ipc::jobs::CompletionKind;
use crate::ipc::types::{AppState, Reply, Request};
use serde_json::json;

fn details_json(d: &HistoryDetails) -> serde_json::Value {
    json!({
        "date": d.key.date_param(),
        "classId": d.key.class_id,
        "subjectId": d.key.subject_id,
        "period": d.key.period,
        "present": students_json(&d.present),
        "absent": students_json(&d.absent),
        "notMarked": students_json(&d.not_marked),
        "counts": {
            "present": d.present.len(),
            "absent": d.absent.len(),
            "notMarked": d.not_marked.len(),
        },
    })
}

fn handle_history_details(state: &mut AppState, req: &Request) -> Reply {
    let prepared = require_resolver(state).and_then(|r| {
        let key = parse_selection_key(&req.params)?;
        if key.class_id.is_none() {
            return Err(HandlerErr::bad_params("missing classId"));
        }
        Ok((r, key))
    });
    let (resolver, key) = match prepared {
        Ok(v) => v,
        Err(e) => return Reply::Now(e.response(&req.id)),
    };
    state.jobs.spawn(&req.id, move || {
        CompletionKind::Ready(
            load_details_for_date(&resolver, &key)
                .map(|d| details_json(&d))
                .map_err(|e| HandlerErr::fetch_failed(&e)),
        )
    });
    Reply::Deferred
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Reply> {
    match req.method.as_str() {
        "history.details" => Some(handle_history_details(state, req)),
        _ => None,
    }
}
