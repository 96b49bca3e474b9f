use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line from the UI. `params` may be omitted for methods that
/// take none.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Process-wide state: at most one open workspace at a time.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    /// Replaces whatever workspace was open before.
    pub fn attach(&mut self, workspace: PathBuf, conn: Connection) {
        self.workspace = Some(workspace);
        self.db = Some(conn);
    }

    pub fn workspace_path(&self) -> Option<String> {
        self.workspace
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }
}
