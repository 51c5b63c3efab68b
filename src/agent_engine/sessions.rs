use std::collections::HashMap;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::event_bus::{CancelFlag, SessionEvent, StatusFeed};
use crate::agent_engine::state::{Objective, SessionState, SessionStatus};
use crate::errors::{WebClawError, WebClawResult};

struct ManagedSession {
    cancel: CancelFlag,
    feed: StatusFeed,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<SessionState>,
}

/// Hosts independent sessions, each on its own task with its own browser.
/// Nothing mutable is shared between them.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<String, ManagedSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `engine` on `objective`; returns the new session's id.
    pub fn spawn(&mut self, engine: AgentEngine, objective: Objective) -> String {
        let state = SessionState::new(objective);
        let session_id = state.session_id.clone();
        let cancel = engine.cancel_flag();
        let feed = engine.feed();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Running);
        tracing::info!(session = %session_id, objective = %state.objective, "session spawned");

        let task = tokio::spawn(async move {
            let finished = engine.run_session(state).await;
            let _ = status_tx.send(finished.status);
            finished
        });

        self.sessions.insert(
            session_id.clone(),
            ManagedSession {
                cancel,
                feed,
                status: status_rx,
                task,
            },
        );
        session_id
    }

    pub fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.sessions.get(session_id).map(|s| *s.status.borrow())
    }

    /// `(session_id, status)` for every hosted session, sorted by id.
    pub fn list(&self) -> Vec<(String, SessionStatus)> {
        let mut all: Vec<_> = self
            .sessions
            .iter()
            .map(|(id, s)| (id.clone(), *s.status.borrow()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn subscribe(&self, session_id: &str) -> Option<tokio::sync::broadcast::Receiver<SessionEvent>> {
        self.sessions.get(session_id).map(|s| s.feed.subscribe())
    }

    /// Request a cooperative abort. Returns false for unknown ids.
    pub fn abort(&self, session_id: &str) -> bool {
        match self.sessions.get(session_id) {
            Some(s) => {
                s.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for a session to reach its terminal state and stop hosting it.
    pub async fn join(&mut self, session_id: &str) -> WebClawResult<SessionState> {
        let session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| WebClawError::Config(format!("unknown session '{session_id}'")))?;
        session
            .task
            .await
            .map_err(|e| WebClawError::Task(format!("session {session_id}: {e}")))
    }
}
