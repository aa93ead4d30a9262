use crate::checkin::{load_day, TeacherDay};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_date, require_resolver};
use crate::ipc::jobs::CompletionKind;
use crate::ipc::types::{AppState, Reply, Request};
use serde_json::json;

fn day_json(d: &TeacherDay) -> serde_json::Value {
    let fmt = |t: Option<chrono::NaiveTime>| t.map(|t| t.format("%H:%M:%S").to_string());
    json!({
        "date": d.date.format("%Y-%m-%d").to_string(),
        "state": d.state.as_str(),
        "checkIn": fmt(d.check_in),
        "checkOut": fmt(d.check_out),
    })
}

fn handle_checkin_status(state: &mut AppState, req: &Request) -> Reply {
    let prepared = require_resolver(state)
        .and_then(|r| get_date(&req.params, "date").map(|date| (r, date)));
    let (resolver, date) = match prepared {
        Ok(v) => v,
        Err(e) => return Reply::Now(e.response(&req.id)),
    };
    state.jobs.spawn(&req.id, move || {
        CompletionKind::Ready(
            load_day(resolver.api(), resolver.session(), date)
                .map(|d| day_json(&d))
                .map_err(|e| HandlerErr::fetch_failed(&e)),
        )
    });
    Reply::Deferred
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Reply> {
    match req.method.as_str() {
        "checkin.status" => Some(handle_checkin_status(state, req)),
        _ => None,
    }
}
