pub mod agent_engine;
pub mod browser;
pub mod config;
pub mod decision;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent_engine::state::{Objective, SessionState};
use crate::agent_engine::AgentEngine;
use crate::browser::chrome::ChromeDriver;
use crate::browser::BrowserDriver;
use crate::decision::DecisionClient;
use crate::errors::{WebClawError, WebClawResult};
use crate::executor::safety::SafetyGate;
use crate::llm::registry::{ProviderRegistry, DECISION_ROLE};

/// Options for a single command-line session.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub objective: String,
    pub config_path: Option<PathBuf>,
    pub headed: bool,
    pub max_steps: Option<u32>,
    pub start_url: Option<String>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Launch Chrome, run one session to a terminal state and return it.
pub async fn run(opts: RunOptions) -> WebClawResult<SessionState> {
    init_tracing();

    // .env is optional
    let _ = dotenvy::dotenv();

    let mut config = config::load_or_default(opts.config_path.as_deref())?;
    if opts.headed {
        config.browser.headless = false;
    }
    if let Some(n) = opts.max_steps {
        config.agent.max_steps = n;
    }
    if opts.start_url.is_some() {
        config.browser.start_url = opts.start_url.clone();
    }

    let objective = Objective::new(opts.objective)?;

    let registry = ProviderRegistry::from_config(&config)?;
    let (provider, call) = registry.call_config_for_role(DECISION_ROLE)?;
    tracing::info!(provider = provider.name(), model = %call.model, "decision model selected");
    let decider = DecisionClient::new(provider, call, config.agent.history_window);

    let browser_cfg = config.browser.clone();
    let chrome = tokio::task::spawn_blocking(move || ChromeDriver::launch(&browser_cfg))
        .await
        .map_err(|e| WebClawError::Task(format!("browser launch: {e}")))??;
    let driver: Arc<dyn BrowserDriver> = Arc::new(chrome);

    if let Some(start) = &config.browser.start_url {
        let url = SafetyGate::new(&config.safety).normalize_url(start)?;
        tracing::info!(url = %url, "opening start page");
        driver.navigate(&url).await?;
    }

    let engine = AgentEngine::new(driver, decider, &config)?;
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping after the current step");
            cancel.cancel();
        }
    });

    Ok(engine.run(objective).await)
}
