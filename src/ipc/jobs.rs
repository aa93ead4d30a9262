use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;

use tracing::error;

use super::error::HandlerErr;
use super::types::Request;
use crate::api::ApiError;
use crate::model::BulkReply;
use crate::reconcile::{LoadTicket, SelectionSnapshot};
use crate::submit::SubmitBatch;

/// Everything the main loop reacts to, in arrival order.
pub enum Event {
    Request(Request),
    BadLine(String),
    Completed(Completion),
    InputClosed,
}

pub struct Completion {
    pub id: String,
    pub kind: CompletionKind,
}

pub enum CompletionKind {
    /// Read-only fetch with a finished result.
    Ready(Result<serde_json::Value, HandlerErr>),
    SelectionLoaded {
        ticket: LoadTicket,
        result: Result<SelectionSnapshot, ApiError>,
    },
    Submitted {
        batch: SubmitBatch,
        result: Result<BulkReply, ApiError>,
    },
}

/// Runs fetches off the main thread and posts their completions back.
pub struct JobQueue {
    events: Sender<Event>,
    outstanding: usize,
}

impl JobQueue {
    pub fn new(events: Sender<Event>) -> Self {
        Self {
            events,
            outstanding: 0,
        }
    }

    pub fn spawn<F>(&mut self, id: &str, job: F)
    where
        F: FnOnce() -> CompletionKind + Send + 'static,
    {
        self.outstanding += 1;
        let events = self.events.clone();
        let id = id.to_string();
        std::thread::spawn(move || {
            let kind = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                error!(request = %id, "worker panicked");
                CompletionKind::Ready(Err(HandlerErr::new("internal", "worker panicked")))
            });
            // The receiver only goes away at shutdown.
            let _ = events.send(Event::Completed(Completion { id, kind }));
        });
    }

    pub fn finished(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}
