use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, LlmConfig};
use crate::errors::{WebClawError, WebClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

pub const DECISION_ROLE: &str = "decision";

/// Registry of configured providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            active: llm_config.active_provider.clone(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> WebClawResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            WebClawError::Config(format!("Active provider '{}' not found in registry", self.active))
        })
    }

    /// Provider and call settings for a named role.
    ///
    /// `[llm.roles.<role>]` wins; otherwise the active provider's default model
    /// and temperature are used, non-streaming.
    pub fn call_config_for_role(&self, role: &str) -> WebClawResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let role_entry = match role {
            DECISION_ROLE => self.llm_config.roles.decision.as_ref(),
            other => {
                tracing::warn!(role = other, "unknown role, falling back to active provider");
                None
            }
        };

        if let Some(entry) = role_entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                WebClawError::Config(format!(
                    "Role '{role}' references unknown provider '{}'",
                    entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role,
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature,
                "resolved role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                },
            ));
        }

        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(role, provider = %self.active, model = %model, "role not configured, using active provider");
        Ok((
            provider,
            CallConfig {
                model,
                stream: false,
                temperature,
            },
        ))
    }

    /// Build a registry from the loaded app config.
    /// `WEBCLAW_<ID>_API_KEY` overrides any key stored in the file.
    pub fn from_config(config: &AppConfig) -> WebClawResult<Self> {
        let mut registry = Self::new(config.llm.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(api_key_var(id))
                .ok()
                .or_else(|| entry.api_key.clone())
                .unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                Duration::from_secs(entry.timeout_secs),
                entry.json_mode,
            )?;
            registry.register(Arc::new(provider));
        }
        Ok(registry)
    }
}

fn api_key_var(id: &str) -> String {
    format!("WEBCLAW_{}_API_KEY", id.to_uppercase().replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
        [llm]
        active_provider = "openai"

        [llm.providers.openai]
        display_name = "OpenAI"
        api_base = "https://api.openai.com/v1/chat/completions"
        model = "gpt-4o"
        temperature = 0.3

        [llm.providers.local-vl]
        display_name = "Local"
        api_base = "http://127.0.0.1:8000/v1/chat/completions"
        model = "qwen-vl"
    "#;

    #[test]
    fn falls_back_to_active_provider() {
        let cfg = parse_config(CONFIG).unwrap();
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        let (provider, call) = registry.call_config_for_role(DECISION_ROLE).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(call.model, "gpt-4o");
        assert_eq!(call.temperature, 0.3);
        assert!(!call.stream);
    }

    #[test]
    fn decision_role_overrides() {
        let text = format!(
            "{CONFIG}\n[llm.roles.decision]\nprovider = \"local-vl\"\nmodel = \"qwen2.5-vl\"\nstream = true\n"
        );
        let cfg = parse_config(&text).unwrap();
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        let (provider, call) = registry.call_config_for_role(DECISION_ROLE).unwrap();
        assert_eq!(provider.name(), "local-vl");
        assert_eq!(call.model, "qwen2.5-vl");
        assert!(call.stream);
        assert_eq!(call.temperature, 0.1);
    }

    #[test]
    fn role_with_unknown_provider_is_config_error() {
        let text = format!("{CONFIG}\n[llm.roles.decision]\nprovider = \"nope\"\nmodel = \"x\"\n");
        let cfg = parse_config(&text).unwrap();
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        assert!(matches!(
            registry.call_config_for_role(DECISION_ROLE),
            Err(WebClawError::Config(_))
        ));
    }

    #[test]
    fn env_var_name_is_normalized() {
        assert_eq!(api_key_var("local-vl"), "WEBCLAW_LOCAL_VL_API_KEY");
    }
}
