use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::timer::FocusTimer;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Local user identity, assigned when the workspace opens.
    pub user_id: Option<String>,
    /// The one focus timer this session owns.
    pub timer: FocusTimer,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            user_id: None,
            timer: FocusTimer::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
