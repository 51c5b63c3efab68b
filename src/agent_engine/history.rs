use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::{ActionOutcome, SessionState};
use crate::errors::WebClawResult;

/// One line of a session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Outcome { session_id: String, outcome: ActionOutcome },
    Terminal { state: SessionState },
}

/// Append-only session log: in memory, and mirrored to `session_<id>.jsonl`
/// when a directory is configured.
pub struct SessionHistory {
    pub session_id: String,
    entries: Vec<HistoryEntry>,
    file_path: Option<PathBuf>,
}

impl SessionHistory {
    /// Log under `dir`, created if missing.
    pub fn in_dir(dir: &Path, session_id: &str) -> WebClawResult<Self> {
        std::fs::create_dir_all(dir)?;
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        tracing::debug!(path = %file_path.display(), "session history opened");
        Ok(Self {
            session_id: session_id.to_string(),
            entries: Vec::new(),
            file_path: Some(file_path),
        })
    }

    pub fn in_memory(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            entries: Vec::new(),
            file_path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record an entry and append it to the file. Entries already written are never touched.
    pub fn append(&mut self, entry: HistoryEntry) -> WebClawResult<()> {
        if let Some(path) = &self.file_path {
            let line = serde_json::to_string(&entry)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(file, "{line}")?;
            tracing::debug!(path = %path.display(), "history entry flushed");
        }
        self.entries.push(entry);
        Ok(())
    }
}

/// `<data_local_dir>/webclaw/sessions`, falling back to `./sessions`.
pub fn default_sessions_dir() -> PathBuf {
    match dirs::data_local_dir() {
        Some(base) => base.join("webclaw").join("sessions"),
        None => PathBuf::from("sessions"),
    }
}

/// Read back a session log, e.g. for reporting.
pub fn read_session(path: &Path) -> WebClawResult<Vec<HistoryEntry>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(Into::into))
        .collect()
}
