mod api;
mod checkin;
mod config;
mod history;
mod ipc;
mod model;
mod reconcile;
mod roster;
mod submit;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Sender};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ATTENDANCED_LOG";

fn init_tracing() {
    // stdout carries IPC; logs go to stderr.
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn spawn_stdin_reader(events: Sender<ipc::Event>) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(v) => v,
                Err(_) => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<ipc::Request>(&line) {
                Ok(req) => ipc::Event::Request(req),
                Err(e) => ipc::Event::BadLine(e.to_string()),
            };
            if events.send(event).is_err() {
                return;
            }
        }
        let _ = events.send(ipc::Event::InputClosed);
    });
}

fn main() {
    init_tracing();

    let config = match config::Config::load() {
        Ok(v) => v,
        Err(e) => {
            error!("invalid configuration: {:#}", e);
            std::process::exit(2);
        }
    };
    info!(
        api = %config.api_base_url,
        teacher = ?config.teacher_email,
        "attendanced starting"
    );

    let (tx, rx) = mpsc::channel();
    let mut state = ipc::AppState::new(config, tx.clone());
    spawn_stdin_reader(tx);

    let mut stdout = io::stdout();
    let mut input_closed = false;

    for event in rx.iter() {
        let resp = match event {
            ipc::Event::Request(req) => match ipc::handle_request(&mut state, req) {
                ipc::Reply::Now(v) => Some(v),
                ipc::Reply::Deferred => None,
            },
            ipc::Event::Completed(c) => Some(ipc::handle_completion(&mut state, c)),
            // Can't reply without id.
            ipc::Event::BadLine(message) => Some(serde_json::json!({
                "ok": false,
                "error": { "code": "bad_json", "message": message }
            })),
            ipc::Event::InputClosed => {
                input_closed = true;
                None
            }
        };

        if let Some(v) = resp {
            let _ = writeln!(
                stdout,
                "{}",
                serde_json::to_string(&v).unwrap_or_else(|_| "{\"ok\":false}".to_string())
            );
            let _ = stdout.flush();
        }

        if input_closed && state.jobs.outstanding() == 0 {
            break;
        }
    }
    info!("attendanced stopped");
}
