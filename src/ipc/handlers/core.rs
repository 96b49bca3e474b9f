use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

/// Opens (or creates) the workspace database and makes it the active one.
/// Returns how many default subjects were seeded.
pub fn open_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<usize> {
    let opened = db::open_db(&path)?;
    info!(workspace = %path.display(), "workspace opened");
    state.attach(path, opened.conn);
    Ok(opened.seeded_subjects)
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace_path()
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, path.clone()) {
        Ok(seeded) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "seededSubjects": seeded
            }),
        ),
        Err(e) => {
            error!(workspace = %path.display(), "open failed: {e:?}");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
