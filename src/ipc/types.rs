use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line from the host.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The open workspace, if any. Every storage method answers `no_workspace`
/// until one is selected.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
