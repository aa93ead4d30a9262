use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Reply, Request};
use crate::roster::Session;
use serde_json::json;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "apiBaseUrl": state.config.api_base_url,
            "teacherEmail": state.session.as_ref().map(|s| s.teacher_email.clone()),
            "hasSelection": state.live.selection().is_some(),
            "outstandingJobs": state.jobs.outstanding(),
        }),
    )
}

fn session_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "teacherEmail")?;
    if !email.contains('@') {
        return Err(HandlerErr {
            code: "bad_params",
            message: "teacherEmail must be an email address".to_string(),
            details: Some(json!({ "teacherEmail": email })),
        });
    }
    let session = Session::new(email);
    let changed = state.session.as_ref() != Some(&session);
    if changed {
        // A different teacher must never inherit unsaved marks.
        state.live.reset();
    }
    info!(teacher = %session.teacher_email, changed, "session opened");
    let teacher_email = session.teacher_email.clone();
    state.session = Some(session);
    Ok(json!({ "teacherEmail": teacher_email }))
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = session_open(state, &req.params);
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Reply> {
    match req.method.as_str() {
        "health" => Some(Reply::Now(handle_health(state, req))),
        "session.open" => Some(Reply::Now(handle_session_open(state, req))),
        _ => None,
    }
}
