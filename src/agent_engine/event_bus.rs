use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::agent_engine::state::{ActionOutcome, SessionState};

/// Per-step snapshot for front-ends.
#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub session_id: String,
    pub step_count: u32,
    pub thought: String,
    pub outcome: ActionOutcome,
    /// Annotated PNG, base64.
    pub annotated_image_b64: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: String,
        objective: String,
    },
    Retrying {
        session_id: String,
        step: u32,
        attempt: u32,
        error: String,
    },
    Step(StepSnapshot),
    Terminal {
        state: SessionState,
    },
}

/// Observational broadcast; publishing never blocks and never fails the loop.
#[derive(Clone)]
pub struct StatusFeed {
    tx: broadcast::Sender<SessionEvent>,
}

impl StatusFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    pub fn publish(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Cooperative abort request, checked at step boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            tracing::info!("abort requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::Objective;

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let feed = StatusFeed::new(4);
        feed.publish(SessionEvent::Started { session_id: "a".into(), objective: "x".into() });
        let mut rx = feed.subscribe();
        assert!(feed.has_subscribers());
        let state = SessionState::new(Objective::new("x").unwrap());
        feed.publish(SessionEvent::Terminal { state });
        match rx.recv().await.unwrap() {
            SessionEvent::Terminal { state } => assert_eq!(state.objective.as_str(), "x"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
