mod calc;
mod db;
mod ipc;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};

const WORKSPACE_ENV: &str = "GRADEBOOKD_WORKSPACE";

fn init_logging() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gradebookd=info".into()),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    init_logging();
    info!("gradebookd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState::default();

    if let Some(path) = std::env::var_os(WORKSPACE_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(path);
        if let Err(e) = ipc::open_workspace(&mut state, path.clone()) {
            // The UI can still pick a workspace with workspace.select.
            error!(workspace = %path.display(), "{} could not be opened: {e:?}", WORKSPACE_ENV);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                warn!("bad request line: {e}");
                let _ = writeln!(stdout, "{}", ipc::bad_json(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("stdin closed, shutting down");
}
