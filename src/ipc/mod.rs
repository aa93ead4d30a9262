mod error;
mod handlers;
mod helpers;
mod jobs;
mod router;
mod types;

pub use jobs::Event;
pub use router::{handle_completion, handle_request};
pub use types::{AppState, Reply, Request};
