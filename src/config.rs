use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{WebClawError, WebClawResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var WEBCLAW_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Ask the endpoint for `response_format = json_object`.
    #[serde(default)]
    pub json_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Vision-capable model that turns an annotated scene into the next decision.
    pub decision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

fn default_request_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: u32,
    /// Attempts per step for perception + decision before the session fails.
    pub step_attempts: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Number of most recent outcomes sent with each decision request.
    pub history_window: usize,
    pub max_consecutive_failures: u32,
    /// 0 disables the wall-clock limit.
    pub max_duration_minutes: u32,
    pub action_timeout_secs: u64,
    /// JSONL session logs. Defaults to `<data_local_dir>/webclaw/sessions`.
    pub history_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            step_attempts: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 8_000,
            history_window: 8,
            max_consecutive_failures: 5,
            max_duration_minutes: 0,
            action_timeout_secs: 30,
            history_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub chrome_path: Option<PathBuf>,
    pub start_url: Option<String>,
    /// Interaction strategies in the order they are attempted.
    pub strategies: Vec<String>,
    pub scan_attempts: u32,
    pub scan_retry_delay_ms: u64,
    pub max_elements: usize,
    /// Post-action screenshots land in `<artifacts_dir>/<session_id>/`.
    pub artifacts_dir: Option<PathBuf>,
    /// Also the default timeout for every blocking tab call.
    pub navigation_timeout_secs: u64,
    /// Deadline for one perception pass (scan, screenshot, annotate).
    pub scan_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 800,
            chrome_path: None,
            start_url: None,
            strategies: vec!["native".into(), "script".into(), "coordinate".into()],
            scan_attempts: 3,
            scan_retry_delay_ms: 400,
            max_elements: 250,
            artifacts_dir: None,
            navigation_timeout_secs: 30,
            scan_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub allow_execute_script: bool,
    pub max_wait_ms: u64,
    pub allowed_url_schemes: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allow_execute_script: true,
            max_wait_ms: 10_000,
            allowed_url_schemes: ["http", "https", "about", "file", "data"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

fn resolve_config_path() -> WebClawResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(WebClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Load from an explicit path, or search the default locations.
pub fn load_config(explicit: Option<&Path>) -> WebClawResult<AppConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => resolve_config_path()?,
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

/// Like [`load_config`], but a missing default config file yields defaults.
/// An explicit path must exist.
pub fn load_or_default(explicit: Option<&Path>) -> WebClawResult<AppConfig> {
    if explicit.is_some() {
        return load_config(explicit);
    }
    match resolve_config_path() {
        Ok(path) => load_config(Some(&path)),
        Err(e) => {
            tracing::info!(reason = %e, "no config file, using defaults");
            Ok(AppConfig::default())
        }
    }
}

pub fn parse_config(content: &str) -> WebClawResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if config.agent.step_attempts == 0 {
        return Err(WebClawError::Config("agent.step_attempts must be at least 1".into()));
    }
    if config.browser.strategies.is_empty() {
        return Err(WebClawError::Config("browser.strategies must not be empty".into()));
    }
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> WebClawResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
