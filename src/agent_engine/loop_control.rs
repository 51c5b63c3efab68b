use std::time::{Duration, Instant};

use crate::agent_engine::state::SessionState;
use crate::config::AgentConfig;

/// Session-level budgets: steps, consecutive failures, wall clock, and the
/// backoff schedule for whole-step retries.
pub struct LoopController {
    max_steps: u32,
    max_consecutive_failures: u32,
    max_duration: Option<Duration>,
    backoff_base: Duration,
    backoff_cap: Duration,
    start_time: Instant,
}

impl LoopController {
    pub fn new(cfg: &AgentConfig) -> Self {
        Self {
            max_steps: cfg.max_steps,
            max_consecutive_failures: cfg.max_consecutive_failures,
            max_duration: (cfg.max_duration_minutes > 0)
                .then(|| Duration::from_secs(cfg.max_duration_minutes as u64 * 60)),
            backoff_base: Duration::from_millis(cfg.retry_backoff_ms),
            backoff_cap: Duration::from_millis(cfg.max_backoff_ms.max(cfg.retry_backoff_ms)),
            start_time: Instant::now(),
        }
    }

    /// Reason the session must stop before starting another step, if any.
    pub fn should_stop(&self, state: &SessionState) -> Option<String> {
        if state.step_count >= self.max_steps {
            return Some(format!(
                "step budget of {} exhausted without completing the objective",
                self.max_steps
            ));
        }
        let failures = state.consecutive_failures();
        if self.max_consecutive_failures > 0 && failures >= self.max_consecutive_failures {
            return Some(format!("{failures} consecutive failed actions"));
        }
        if let Some(limit) = self.max_duration {
            if self.start_time.elapsed() >= limit {
                return Some(format!("time limit of {}s reached", limit.as_secs()));
            }
        }
        None
    }

    /// Delay before retry `attempt` (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::{ActionOutcome, Objective};
    use crate::decision::types::Action;

    fn cfg() -> AgentConfig {
        AgentConfig {
            max_steps: 3,
            max_consecutive_failures: 2,
            retry_backoff_ms: 100,
            max_backoff_ms: 350,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let ctl = LoopController::new(&cfg());
        assert_eq!(ctl.backoff(1), Duration::from_millis(100));
        assert_eq!(ctl.backoff(2), Duration::from_millis(200));
        assert_eq!(ctl.backoff(3), Duration::from_millis(350));
        assert_eq!(ctl.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn stops_on_step_budget_and_failure_streak() {
        let ctl = LoopController::new(&cfg());
        let mut state = SessionState::new(Objective::new("x").unwrap());
        assert!(ctl.should_stop(&state).is_none());

        state.record_outcome(ActionOutcome::failed(1, Action::GoBack, "e")).unwrap();
        assert!(ctl.should_stop(&state).is_none());
        state.record_outcome(ActionOutcome::failed(2, Action::GoBack, "e")).unwrap();
        assert!(ctl.should_stop(&state).unwrap().contains("consecutive"));

        let mut state = SessionState::new(Objective::new("x").unwrap());
        state.step_count = 3;
        assert!(ctl.should_stop(&state).unwrap().contains("step budget"));
    }
}
