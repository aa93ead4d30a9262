use super::handlers;
use super::jobs::{Completion, CompletionKind};
use super::types::{AppState, Reply, Request};
use crate::ipc::error::{err, respond};

pub fn handle_request(state: &mut AppState, req: Request) -> Reply {
    if let Some(reply) = handlers::core::try_handle(state, &req) {
        return reply;
    }
    if let Some(reply) = handlers::roster::try_handle(state, &req) {
        return reply;
    }
    if let Some(reply) = handlers::attendance::try_handle(state, &req) {
        return reply;
    }
    if let Some(reply) = handlers::history::try_handle(state, &req) {
        return reply;
    }
    if let Some(reply) = handlers::checkin::try_handle(state, &req) {
        return reply;
    }

    Reply::Now(err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    ))
}

/// Turns a finished worker job into the response for its request.
pub fn handle_completion(state: &mut AppState, completion: Completion) -> serde_json::Value {
    state.jobs.finished();
    let Completion { id, kind } = completion;
    match kind {
        CompletionKind::Ready(result) => respond(&id, result),
        CompletionKind::SelectionLoaded { ticket, result } => {
            handlers::attendance::complete_selection(state, &id, ticket, result)
        }
        CompletionKind::Submitted { batch, result } => {
            handlers::attendance::complete_submit(state, &id, batch, result)
        }
    }
}
