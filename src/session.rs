use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

pub const DEFAULT_SESSION_TITLE: &str = "Nueva Conversación";

/// Session category. Fixed at creation; the remote store keeps general
/// and clinical consultation threads apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    General,
    Clinical,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::General => write!(f, "general"),
            SessionMode::Clinical => write!(f, "clinical"),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" => Ok(SessionMode::General),
            "clinical" | "clinica" => Ok(SessionMode::Clinical),
            other => Err(format!("unknown session mode: {}", other)),
        }
    }
}

/// A file the server accepted earlier but has not processed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFile {
    pub name: String,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub mode: SessionMode,
    pub messages: Vec<ChatMessage>,
    pub pending_files: Vec<PendingFile>,
    /// Locally fabricated record awaiting reconciliation with the remote
    /// list; the server version replaces it wholesale once visible.
    pub synthetic: bool,
}

impl ChatSession {
    pub fn new(id: impl Into<String>, title: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            mode,
            messages: Vec::new(),
            pending_files: Vec::new(),
            synthetic: false,
        }
    }

    /// Minimal stand-in for a session named by navigation but not yet
    /// visible in the remote list.
    pub fn synthetic(id: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            mode,
            messages: Vec::new(),
            pending_files: Vec::new(),
            synthetic: true,
        }
    }
}
