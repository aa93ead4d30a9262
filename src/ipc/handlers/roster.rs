use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_id, require_resolver, students_json};
use crate::ipc::jobs::CompletionKind;
use crate::ipc::types::{AppState, Reply, Request};
use crate::roster::ClassOptions;
use serde_json::json;

fn class_options_json(opts: &ClassOptions) -> serde_json::Value {
    let assignments: Vec<serde_json::Value> = opts
        .assignments
        .iter()
        .map(|a| {
            json!({
                "classId": a.class_id,
                "subjectId": a.subject_id,
                "subjectName": a.subject_name,
                "teacherEmail": a.teacher_email,
            })
        })
        .collect();
    let classes: Vec<serde_json::Value> = opts
        .classes
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "className": c.class_name,
                "section": c.section,
            })
        })
        .collect();
    json!({ "assignments": assignments, "classes": classes })
}

fn handle_roster_classes(state: &mut AppState, req: &Request) -> Reply {
    let resolver = match require_resolver(state) {
        Ok(v) => v,
        Err(e) => return Reply::Now(e.response(&req.id)),
    };
    state.jobs.spawn(&req.id, move || {
        CompletionKind::Ready(
            resolver
                .class_options()
                .map(|opts| class_options_json(&opts))
                .map_err(|e| HandlerErr::fetch_failed(&e)),
        )
    });
    Reply::Deferred
}

fn handle_roster_students(state: &mut AppState, req: &Request) -> Reply {
    let prepared = require_resolver(state)
        .and_then(|r| get_required_id(&req.params, "classId").map(|class_id| (r, class_id)));
    let (resolver, class_id) = match prepared {
        Ok(v) => v,
        Err(e) => return Reply::Now(e.response(&req.id)),
    };
    state.jobs.spawn(&req.id, move || {
        CompletionKind::Ready(
            resolver
                .resolve_students(class_id)
                .map(|students| {
                    json!({ "classId": class_id, "students": students_json(&students) })
                })
                .map_err(|e| HandlerErr::fetch_failed(&e)),
        )
    });
    Reply::Deferred
}

fn handle_roster_periods(state: &mut AppState, req: &Request) -> serde_json::Value {
    let periods: Vec<serde_json::Value> = state
        .config
        .periods
        .iter()
        .map(|p| json!({ "label": p.label, "isBreak": p.is_break }))
        .collect();
    respond(&req.id, Ok(json!({ "periods": periods })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Reply> {
    match req.method.as_str() {
        "roster.classes" => Some(handle_roster_classes(state, req)),
        "roster.students" => Some(handle_roster_students(state, req)),
        "roster.periods" => Some(Reply::Now(handle_roster_periods(state, req))),
        _ => None,
    }
}
