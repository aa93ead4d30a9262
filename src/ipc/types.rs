use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::Deserialize;

use super::jobs::{Event, JobQueue};
use crate::api::{HttpApi, SchoolApi};
use crate::config::Config;
use crate::reconcile::LiveSession;
use crate::roster::{RosterResolver, Session};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Either an immediate response, or a promise that a worker will complete it.
#[derive(Debug)]
pub enum Reply {
    Now(serde_json::Value),
    Deferred,
}

pub struct AppState {
    pub config: Config,
    pub api: Arc<dyn SchoolApi>,
    pub session: Option<Session>,
    pub live: LiveSession,
    pub jobs: JobQueue,
}

impl AppState {
    pub fn new(config: Config, events: Sender<Event>) -> Self {
        let api: Arc<dyn SchoolApi> = Arc::new(HttpApi::new(&config));
        Self::with_api(config, api, events)
    }

    pub fn with_api(config: Config, api: Arc<dyn SchoolApi>, events: Sender<Event>) -> Self {
        let session = config.teacher_email.clone().map(Session::new);
        Self {
            config,
            api,
            session,
            live: LiveSession::new(),
            jobs: JobQueue::new(events),
        }
    }

    pub fn resolver(&self) -> Option<RosterResolver> {
        self.session
            .clone()
            .map(|s| RosterResolver::new(self.api.clone(), s))
    }
}
