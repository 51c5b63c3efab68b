use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::agent_engine::state::{ActionOutcome, OutcomeStatus};
use crate::browser::BrowserDriver;
use crate::decision::types::{Action, ClickTarget};
use crate::errors::{WebClawError, WebClawResult};
use crate::executor::resolve::resolve;
use crate::executor::safety::SafetyGate;
use crate::executor::strategy::{Interaction, InteractionStrategy};
use crate::perception::types::{find_element, IndexedElement};

const MAX_DETAIL_CHARS: usize = 2_000;

struct Performed {
    status: OutcomeStatus,
    strategy: Option<&'static str>,
    detail: Option<String>,
}

impl Performed {
    fn direct() -> Self {
        Self {
            status: OutcomeStatus::Success,
            strategy: None,
            detail: None,
        }
    }
}

/// Maps validated actions onto browser operations for one session.
pub struct ActionExecutor {
    driver: Arc<dyn BrowserDriver>,
    cascade: Vec<Box<dyn InteractionStrategy>>,
    safety: SafetyGate,
    artifacts_dir: Option<PathBuf>,
}

impl ActionExecutor {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        cascade: Vec<Box<dyn InteractionStrategy>>,
        safety: SafetyGate,
    ) -> Self {
        Self {
            driver,
            cascade,
            safety,
            artifacts_dir: None,
        }
    }

    /// Post-action screenshots are written to `dir/step_<n>.png`.
    pub fn set_artifacts_dir(&mut self, dir: PathBuf) {
        self.artifacts_dir = Some(dir);
    }

    /// How long `action` may take, given the per-action timeout `base`.
    pub fn time_budget(&self, action: &Action, base: Duration) -> Duration {
        self.safety.action_budget(action, base)
    }

    /// Perform `action` against the catalog it was decided on. Never returns an
    /// error: failures become a `FAILED` outcome.
    pub async fn execute(&self, step: u32, action: &Action, catalog: &[IndexedElement]) -> ActionOutcome {
        let started = Instant::now();
        let result = self.perform(action, catalog).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut outcome = match result {
            Ok(done) => ActionOutcome {
                step,
                action: action.clone(),
                status: done.status,
                strategy_used: done.strategy.map(str::to_string),
                error: None,
                detail: done.detail,
                duration_ms,
                screenshot_ref: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                tracing::warn!(step, action = %action.describe(), error = %e, "action failed");
                ActionOutcome {
                    duration_ms,
                    ..ActionOutcome::failed(step, action.clone(), e.to_string())
                }
            }
        };
        outcome.screenshot_ref = self.capture(step).await;

        tracing::info!(
            step,
            action = %action.describe(),
            status = ?outcome.status,
            strategy = outcome.strategy_used.as_deref().unwrap_or("-"),
            duration_ms,
            "action executed"
        );
        outcome
    }

    async fn perform(&self, action: &Action, catalog: &[IndexedElement]) -> WebClawResult<Performed> {
        match action {
            Action::Navigate { url } => {
                let url = self.safety.normalize_url(url)?;
                self.driver.navigate(&url).await?;
                Ok(Performed::direct())
            }
            Action::Click(ClickTarget::Element { id }) => {
                self.interact(*id, &Interaction::Click, catalog).await
            }
            Action::Click(ClickTarget::Point { x, y }) => {
                self.driver.click_at(*x, *y).await?;
                Ok(Performed {
                    strategy: Some("coordinate"),
                    ..Performed::direct()
                })
            }
            Action::Type { id, text, clear_first } => {
                let interaction = Interaction::Type {
                    text: text.clone(),
                    clear_first: *clear_first,
                };
                self.interact(*id, &interaction, catalog).await
            }
            Action::Hover { id } => self.interact(*id, &Interaction::Hover, catalog).await,
            Action::Select { id, value } => {
                let interaction = Interaction::Select { value: value.clone() };
                self.interact(*id, &interaction, catalog).await
            }
            Action::Scroll { direction, amount } => {
                let (dx, dy) = direction.delta(*amount);
                self.driver.scroll_by(dx, dy).await?;
                Ok(Performed::direct())
            }
            Action::ExecuteScript { code } => {
                self.safety.check_script()?;
                let value = self.driver.evaluate(code).await?;
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                Ok(Performed {
                    detail: Some(rendered.chars().take(MAX_DETAIL_CHARS).collect()),
                    ..Performed::direct()
                })
            }
            Action::PressKey { key } => {
                self.driver.press_key(key).await?;
                Ok(Performed::direct())
            }
            Action::GoBack => {
                self.driver.go_back().await?;
                Ok(Performed::direct())
            }
            Action::Wait { duration_ms } => {
                let (wait, capped) = self.safety.cap_wait(*duration_ms);
                tokio::time::sleep(wait).await;
                Ok(Performed {
                    detail: capped.then(|| format!("wait capped at {}ms", wait.as_millis())),
                    ..Performed::direct()
                })
            }
            Action::Done { summary } => Ok(Performed {
                detail: summary.clone(),
                ..Performed::direct()
            }),
        }
    }

    /// Run the strategy cascade for an element interaction.
    async fn interact(
        &self,
        id: u32,
        interaction: &Interaction,
        catalog: &[IndexedElement],
    ) -> WebClawResult<Performed> {
        let el = find_element(catalog, id).ok_or(WebClawError::StaleElement(id))?;
        if !el.is_interactable() {
            return Err(WebClawError::interaction(
                "precondition",
                format!("element {id} is not visible and enabled"),
            ));
        }

        let target = resolve(self.driver.as_ref(), el).await?;

        let mut last_err = None;
        for (idx, strategy) in self.cascade.iter().enumerate() {
            match strategy.perform(self.driver.as_ref(), &target, interaction).await {
                Ok(()) => {
                    return Ok(Performed {
                        status: if idx == 0 {
                            OutcomeStatus::Success
                        } else {
                            OutcomeStatus::Recovered
                        },
                        strategy: Some(strategy.name()),
                        detail: target.relocated.then(|| "element re-resolved by bounds".to_string()),
                    });
                }
                Err(e) if e.is_cascade_recoverable() => {
                    tracing::debug!(id, strategy = strategy.name(), error = %e, "strategy failed, trying next");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| WebClawError::interaction("cascade", "no interaction strategies configured")))
    }

    async fn capture(&self, step: u32) -> Option<String> {
        let dir = self.artifacts_dir.as_ref()?;
        let png = match self.driver.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(step, error = %e, "post-action screenshot failed");
                return None;
            }
        };
        let path = dir.join(format!("step_{step}.png"));
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, png).await
        };
        match written.await {
            Ok(()) => Some(path.display().to_string()),
            Err(e) => {
                tracing::warn!(step, path = %path.display(), error = %e, "could not store screenshot");
                None
            }
        }
    }
}
