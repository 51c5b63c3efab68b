// Guards applied before side-effecting actions reach the browser.
use std::time::Duration;

use url::Url;

use crate::config::SafetyConfig;
use crate::decision::types::Action;
use crate::errors::{WebClawError, WebClawResult};

/// Schemes that never use `//` and must not be mistaken for a bare `host:port`.
const OPAQUE_SCHEMES: &[&str] = &["about", "data", "javascript", "vbscript", "mailto", "blob", "file", "chrome"];

pub struct SafetyGate {
    allow_execute_script: bool,
    max_wait: Duration,
    allowed_schemes: Vec<String>,
}

impl SafetyGate {
    pub fn new(cfg: &SafetyConfig) -> Self {
        Self {
            allow_execute_script: cfg.allow_execute_script,
            max_wait: Duration::from_millis(cfg.max_wait_ms),
            allowed_schemes: cfg
                .allowed_url_schemes
                .iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn check_script(&self) -> WebClawResult<()> {
        if self.allow_execute_script {
            Ok(())
        } else {
            Err(WebClawError::Config("EXECUTE_SCRIPT is disabled by safety.allow_execute_script".into()))
        }
    }

    /// Normalize a model-supplied URL; bare hosts become `https://`.
    pub fn normalize_url(&self, raw: &str) -> WebClawResult<String> {
        let raw = raw.trim();
        let explicit = raw.contains("://")
            || raw
                .split_once(':')
                .is_some_and(|(scheme, _)| OPAQUE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()));

        let url = if explicit {
            Url::parse(raw)
        } else {
            Url::parse(&format!("https://{raw}"))
        }
        .map_err(|e| WebClawError::Config(format!("invalid URL '{raw}': {e}")))?;

        if !self.allowed_schemes.iter().any(|s| s == url.scheme()) {
            return Err(WebClawError::Config(format!(
                "URL scheme '{}' is not allowed",
                url.scheme()
            )));
        }
        Ok(url.into())
    }

    /// Deadline for executing `action`. A WAIT gets its own (capped) sleep on
    /// top of `base`, so a permitted wait never trips the action timeout.
    pub fn action_budget(&self, action: &Action, base: Duration) -> Duration {
        match action {
            Action::Wait { duration_ms } => base + self.cap_wait(*duration_ms).0,
            _ => base,
        }
    }

    /// Returns the duration to sleep and whether it was capped.
    pub fn cap_wait(&self, requested_ms: u64) -> (Duration, bool) {
        let requested = Duration::from_millis(requested_ms);
        if requested > self.max_wait {
            (self.max_wait, true)
        } else {
            (requested, false)
        }
    }
}
