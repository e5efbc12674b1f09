use std::path::PathBuf;

use crate::config::ObeConfig;
use crate::draft::ConfigDraft;
use crate::entry::EntrySession;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Session state of one sidecar process. The draft and the entry session
/// belong to a single editor; selecting another course replaces them.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: ObeConfig,
    pub draft: Option<ConfigDraft>,
    pub entry: Option<EntrySession>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            config: ObeConfig::default(),
            draft: None,
            entry: None,
        }
    }
}
