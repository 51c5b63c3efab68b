use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::types::Action;
use crate::errors::{WebClawError, WebClawResult};

/// The user's natural-language goal. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Objective(String);

impl Objective {
    pub fn new(text: impl Into<String>) -> WebClawResult<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(WebClawError::Config("objective must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    Failed,
    /// Succeeded through a fallback strategy.
    Recovered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub step: u32,
    pub action: Action,
    pub status: OutcomeStatus,
    pub strategy_used: Option<String>,
    pub error: Option<String>,
    /// Action-specific payload, e.g. the return value of EXECUTE_SCRIPT.
    pub detail: Option<String>,
    pub duration_ms: u64,
    pub screenshot_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn failed(step: u32, action: Action, error: impl Into<String>) -> Self {
        Self {
            step,
            action,
            status: OutcomeStatus::Failed,
            strategy_used: None,
            error: Some(error.into()),
            detail: None,
            duration_ms: 0,
            screenshot_ref: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != OutcomeStatus::Failed
    }

    /// One line for prompts and logs.
    pub fn summary_line(&self) -> String {
        let status = match self.status {
            OutcomeStatus::Success => "SUCCESS",
            OutcomeStatus::Failed => "FAILED",
            OutcomeStatus::Recovered => "RECOVERED",
        };
        let mut line = format!("step {}: {} -> {status}", self.step, self.action.describe());
        if let Some(s) = &self.strategy_used {
            line.push_str(&format!(" via {s}"));
        }
        if let Some(e) = &self.error {
            line.push_str(&format!(" ({e})"));
        }
        if let Some(d) = &self.detail {
            let head: String = d.chars().take(200).collect();
            line.push_str(&format!(" => {head}"));
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Record of one run. Outcomes are append-only and ordered by step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub objective: Objective,
    pub step_count: u32,
    outcomes: Vec<ActionOutcome>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
    pub summary: Option<String>,
}

impl SessionState {
    pub fn new(objective: Objective) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            objective,
            step_count: 0,
            outcomes: Vec::new(),
            status: SessionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            termination_reason: None,
            summary: None,
        }
    }

    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    /// Append an outcome for the step just executed and advance the counter.
    pub fn record_outcome(&mut self, outcome: ActionOutcome) -> WebClawResult<()> {
        if self.status.is_terminal() {
            return Err(WebClawError::BudgetExceeded(format!(
                "session {} is already {:?}",
                self.session_id, self.status
            )));
        }
        if let Some(last) = self.outcomes.last() {
            if outcome.step <= last.step {
                return Err(WebClawError::Config(format!(
                    "outcome for step {} recorded after step {}",
                    outcome.step, last.step
                )));
            }
        }
        self.step_count = self.step_count.max(outcome.step);
        self.outcomes.push(outcome);
        Ok(())
    }

    /// Trailing run of failed outcomes.
    pub fn consecutive_failures(&self) -> u32 {
        self.outcomes.iter().rev().take_while(|o| !o.is_success()).count() as u32
    }

    /// Move to a terminal status. The first terminal status wins.
    pub fn finish(&mut self, status: SessionStatus, reason: impl Into<String>) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        self.status = status;
        self.termination_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(step: u32, status: OutcomeStatus) -> ActionOutcome {
        ActionOutcome {
            status,
            error: None,
            ..ActionOutcome::failed(step, Action::GoBack, "")
        }
    }

    #[test]
    fn empty_objective_is_rejected() {
        assert!(Objective::new("   ").is_err());
        assert_eq!(Objective::new("  find docs ").unwrap().as_str(), "find docs");
    }

    #[test]
    fn outcomes_are_append_only_and_ordered() {
        let mut s = SessionState::new(Objective::new("x").unwrap());
        s.record_outcome(outcome(1, OutcomeStatus::Success)).unwrap();
        s.record_outcome(outcome(2, OutcomeStatus::Failed)).unwrap();
        assert!(s.record_outcome(outcome(2, OutcomeStatus::Success)).is_err());
        assert_eq!(s.step_count, 2);
        assert_eq!(s.outcomes().len(), 2);
    }

    #[test]
    fn counts_trailing_failures() {
        let mut s = SessionState::new(Objective::new("x").unwrap());
        s.record_outcome(outcome(1, OutcomeStatus::Failed)).unwrap();
        s.record_outcome(outcome(2, OutcomeStatus::Recovered)).unwrap();
        s.record_outcome(outcome(3, OutcomeStatus::Failed)).unwrap();
        s.record_outcome(outcome(4, OutcomeStatus::Failed)).unwrap();
        assert_eq!(s.consecutive_failures(), 2);
    }

    #[test]
    fn first_terminal_status_wins() {
        let mut s = SessionState::new(Objective::new("x").unwrap());
        s.finish(SessionStatus::Aborted, "cancelled");
        s.finish(SessionStatus::Completed, "done");
        assert_eq!(s.status, SessionStatus::Aborted);
        assert_eq!(s.termination_reason.as_deref(), Some("cancelled"));
        assert!(s.finished_at.is_some());
        assert!(s.record_outcome(outcome(1, OutcomeStatus::Success)).is_err());
    }
}
