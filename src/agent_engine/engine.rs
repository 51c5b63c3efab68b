use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use tracing::Instrument;

use crate::agent_engine::event_bus::{CancelFlag, SessionEvent, StatusFeed, StepSnapshot};
use crate::agent_engine::history::{default_sessions_dir, HistoryEntry, SessionHistory};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{ActionOutcome, Objective, SessionState, SessionStatus};
use crate::browser::BrowserDriver;
use crate::config::{AgentConfig, AppConfig};
use crate::decision::types::{Action, Decision};
use crate::decision::DecisionClient;
use crate::errors::{WebClawError, WebClawResult};
use crate::executor::safety::SafetyGate;
use crate::executor::strategy::build_cascade;
use crate::executor::ActionExecutor;
use crate::perception::indexer::ElementIndexer;
use crate::perception::pipeline::perceive;
use crate::perception::types::AnnotatedScene;

/// Where a session's JSONL log goes.
#[derive(Debug, Clone)]
pub enum HistoryMode {
    InMemory,
    Directory(PathBuf),
}

/// The think/act/observe loop for one session. Owns the session's browser
/// for its lifetime; steps run strictly one after another.
pub struct AgentEngine {
    driver: Arc<dyn BrowserDriver>,
    indexer: ElementIndexer,
    decider: DecisionClient,
    executor: ActionExecutor,
    cfg: AgentConfig,
    scan_timeout: Duration,
    history_mode: HistoryMode,
    artifacts_root: Option<PathBuf>,
    feed: StatusFeed,
    cancel: CancelFlag,
}

impl AgentEngine {
    pub fn new(driver: Arc<dyn BrowserDriver>, decider: DecisionClient, config: &AppConfig) -> WebClawResult<Self> {
        let cascade = build_cascade(&config.browser.strategies)?;
        let executor = ActionExecutor::new(driver.clone(), cascade, SafetyGate::new(&config.safety));
        let history_mode = HistoryMode::Directory(
            config
                .agent
                .history_dir
                .clone()
                .unwrap_or_else(default_sessions_dir),
        );
        Ok(Self {
            indexer: ElementIndexer::new(&config.browser),
            driver,
            decider,
            executor,
            cfg: config.agent.clone(),
            scan_timeout: Duration::from_secs(config.browser.scan_timeout_secs.max(1)),
            history_mode,
            artifacts_root: config.browser.artifacts_dir.clone(),
            feed: StatusFeed::default(),
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_history(mut self, mode: HistoryMode) -> Self {
        self.history_mode = mode;
        self
    }

    pub fn with_feed(mut self, feed: StatusFeed) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn feed(&self) -> StatusFeed {
        self.feed.clone()
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(self, objective: Objective) -> SessionState {
        self.run_session(SessionState::new(objective)).await
    }

    /// Drive `state` to a terminal status. Always returns the full record,
    /// whatever the outcome.
    pub async fn run_session(self, state: SessionState) -> SessionState {
        let span = tracing::info_span!("session", session = %state.session_id);
        self.drive(state).instrument(span).await
    }

    async fn drive(mut self, mut state: SessionState) -> SessionState {
        let session_id = state.session_id.clone();
        let mut history = self.open_history(&session_id);
        if let Some(root) = &self.artifacts_root {
            self.executor.set_artifacts_dir(root.join(&session_id));
        }
        let controller = LoopController::new(&self.cfg);

        tracing::info!(objective = %state.objective, max_steps = self.cfg.max_steps, "session started");
        self.feed.publish(SessionEvent::Started {
            session_id: session_id.clone(),
            objective: state.objective.to_string(),
        });

        loop {
            if self.cancel.is_cancelled() {
                state.finish(
                    SessionStatus::Aborted,
                    format!("aborted before step {}", state.step_count + 1),
                );
                break;
            }
            if let Some(reason) = controller.should_stop(&state) {
                state.finish(SessionStatus::Failed, WebClawError::BudgetExceeded(reason).to_string());
                break;
            }

            let step = state.step_count + 1;
            let (scene, decision) = match self.plan_step(&state, &controller).await {
                Ok(planned) => planned,
                Err(WebClawError::Cancelled) => {
                    state.finish(SessionStatus::Aborted, format!("aborted while planning step {step}"));
                    break;
                }
                Err(e) => {
                    tracing::error!(step, error = %e, "step could not be planned");
                    state.finish(SessionStatus::Failed, e.to_string());
                    break;
                }
            };

            let outcome = self.act(step, &decision.action, &scene).await;
            let completed = is_completion(&decision, &outcome);

            if let Err(e) = history.append(HistoryEntry::Outcome {
                session_id: session_id.clone(),
                outcome: outcome.clone(),
            }) {
                tracing::warn!(step, error = %e, "history write failed");
            }
            self.publish_step(&session_id, step, &decision, &outcome, &scene);

            if let Err(e) = state.record_outcome(outcome) {
                state.finish(SessionStatus::Failed, e.to_string());
                break;
            }

            if completed {
                state.summary = Some(match &decision.action {
                    Action::Done { summary: Some(s) } => s.clone(),
                    _ => decision.thought.clone(),
                });
                state.finish(SessionStatus::Completed, format!("objective complete after {step} steps"));
                break;
            }
        }

        tracing::info!(
            status = ?state.status,
            steps = state.step_count,
            reason = state.termination_reason.as_deref().unwrap_or(""),
            "session finished"
        );
        if let Err(e) = history.append(HistoryEntry::Terminal { state: state.clone() }) {
            tracing::warn!(error = %e, "history write failed");
        }
        self.feed.publish(SessionEvent::Terminal { state: state.clone() });
        state
    }

    /// Perceive and decide, re-running the whole pair on retryable failures
    /// until the step's attempt budget runs out.
    async fn plan_step(
        &self,
        state: &SessionState,
        controller: &LoopController,
    ) -> WebClawResult<(AnnotatedScene, Decision)> {
        let step = state.step_count + 1;
        let attempts = self.cfg.step_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = async {
                let scene = tokio::time::timeout(self.scan_timeout, perceive(self.driver.as_ref(), &self.indexer))
                    .await
                    .map_err(|_| {
                        WebClawError::SceneUnavailable(format!(
                            "page scan timed out after {}s",
                            self.scan_timeout.as_secs()
                        ))
                    })??;
                let decision = self
                    .decider
                    .decide(&state.objective, &scene, state.outcomes(), state.step_count)
                    .await?;
                Ok::<_, WebClawError>((scene, decision))
            }
            .await;

            let err = match result {
                Ok(planned) => return Ok(planned),
                Err(e) if e.is_step_retryable() => e,
                Err(e) => return Err(e),
            };

            if attempt >= attempts {
                return Err(WebClawError::BudgetExceeded(format!(
                    "step {step} failed after {attempt} attempts: {err}"
                )));
            }

            let delay = controller.backoff(attempt);
            tracing::warn!(step, attempt, delay_ms = delay.as_millis() as u64, error = %err, "step attempt failed, retrying");
            self.feed.publish(SessionEvent::Retrying {
                session_id: state.session_id.clone(),
                step,
                attempt,
                error: err.to_string(),
            });

            if self.cancel.is_cancelled() {
                return Err(WebClawError::Cancelled);
            }
            tokio::time::sleep(delay).await;
            if self.cancel.is_cancelled() {
                return Err(WebClawError::Cancelled);
            }
            attempt += 1;
        }
    }

    async fn act(&self, step: u32, action: &Action, scene: &AnnotatedScene) -> ActionOutcome {
        let base = Duration::from_secs(self.cfg.action_timeout_secs.max(1));
        let limit = self.executor.time_budget(action, base);
        match tokio::time::timeout(limit, self.executor.execute(step, action, &scene.elements)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(step, action = %action.describe(), "action timed out");
                ActionOutcome {
                    duration_ms: limit.as_millis() as u64,
                    ..ActionOutcome::failed(
                        step,
                        action.clone(),
                        WebClawError::Browser(format!("action timed out after {}ms", limit.as_millis())).to_string(),
                    )
                }
            }
        }
    }

    fn open_history(&self, session_id: &str) -> SessionHistory {
        match &self.history_mode {
            HistoryMode::InMemory => SessionHistory::in_memory(session_id),
            HistoryMode::Directory(dir) => SessionHistory::in_dir(dir, session_id).unwrap_or_else(|e| {
                tracing::warn!(dir = %dir.display(), error = %e, "history directory unavailable, keeping history in memory");
                SessionHistory::in_memory(session_id)
            }),
        }
    }

    fn publish_step(
        &self,
        session_id: &str,
        step: u32,
        decision: &Decision,
        outcome: &ActionOutcome,
        scene: &AnnotatedScene,
    ) {
        if !self.feed.has_subscribers() {
            return;
        }
        self.feed.publish(SessionEvent::Step(StepSnapshot {
            session_id: session_id.to_string(),
            step_count: step,
            thought: decision.thought.clone(),
            outcome: outcome.clone(),
            annotated_image_b64: base64::engine::general_purpose::STANDARD.encode(&scene.image),
        }));
    }
}

/// DONE always completes; otherwise the model must flag completion on a
/// successful no-op.
pub fn is_completion(decision: &Decision, outcome: &ActionOutcome) -> bool {
    decision.objective_complete && decision.action.kind().is_no_op() && outcome.is_success()
}
