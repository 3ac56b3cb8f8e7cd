use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::system_config::SystemConfigStore;

/// Runtime configuration resolved from environment variables, with any
/// persisted `system_config` row shadowing the corresponding environment
/// value at read time (§6, §2a). Mirrors the distilled source's
/// `AGIConfig.from_env()`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root directory for SQLite files and dynamic-component trees.
    pub data_dir: PathBuf,
    /// Provider API keys present in the environment, keyed by provider
    /// name (`"anthropic"`, `"openai"`, …). Presence, not validity,
    /// determines whether a provider is considered configured.
    pub provider_keys: HashMap<String, String>,
    /// Per-task-class model name overrides, e.g. `ZAPPY_MODEL_PLANNING`.
    pub model_overrides: HashMap<String, String>,
    /// Global per-action execution timeout, in milliseconds.
    pub default_timeout_ms: u64,
    /// `true` if self-correction (Corrector + replan escalation) is
    /// enabled.
    pub self_correction_enabled: bool,
}

const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai", "openai_compatible"];

impl RuntimeConfig {
    /// Loads configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let data_dir = env::var("ZAPPY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let mut provider_keys = HashMap::new();
        for provider in KNOWN_PROVIDERS {
            let env_name = format!("{}_API_KEY", provider.to_uppercase());
            if let Ok(value) = env::var(&env_name) {
                if !value.is_empty() {
                    provider_keys.insert((*provider).to_string(), value);
                }
            }
        }

        let mut model_overrides = HashMap::new();
        for task_class in ["PLANNING", "CODING", "CREATIVE", "FAST", "GENERAL"] {
            let env_name = format!("ZAPPY_MODEL_{task_class}");
            if let Ok(value) = env::var(&env_name) {
                model_overrides.insert(task_class.to_string(), value);
            }
        }

        let default_timeout_ms = env::var("ZAPPY_DEFAULT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000);

        let self_correction_enabled = env::var("ZAPPY_SELF_CORRECTION")
            .ok()
            .map_or(true, |v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "off"));

        Self {
            data_dir,
            provider_keys,
            model_overrides,
            default_timeout_ms,
            self_correction_enabled,
        }
    }

    /// Resolves the effective model name for a task class, letting a
    /// persisted `system_config` row (`model.<task_class lowercase>`) win
    /// over the environment override.
    pub fn resolve_model(
        &self,
        store: &SystemConfigStore,
        task_class: &str,
        fallback_model: &str,
    ) -> String {
        let key = format!("model.{}", task_class.to_lowercase());
        let env_value = self.model_overrides.get(task_class).cloned();
        store
            .resolve(&key, env_value.map(serde_json::Value::from).or(None))
            .ok()
            .flatten()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| fallback_model.to_string())
    }

    /// `true` if any credential is present for `provider`.
    #[must_use]
    pub fn has_provider_key(&self, provider: &str) -> bool {
        self.provider_keys.contains_key(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_has_a_sane_fallback() {
        let config = RuntimeConfig {
            data_dir: PathBuf::from("./data"),
            provider_keys: HashMap::new(),
            model_overrides: HashMap::new(),
            default_timeout_ms: 30_000,
            self_correction_enabled: true,
        };
        assert_eq!(config.default_timeout_ms, 30_000);
        assert!(config.self_correction_enabled);
    }
}
