//! Configuration file support
//!
//! Settings come from a TOML file with per-field environment fallbacks; the
//! result is folded into immutable config structs handed to constructors.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use quill_ai::{ProviderConfig, ProviderKind};
use quill_agent::MemoryConfig;

/// Configuration for quill
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default provider (openai, anthropic, google, ollama, openrouter)
    pub provider: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens per response
    pub max_tokens: Option<u32>,
    /// Persona text at the head of the system prompt
    pub persona: Option<String>,
    /// Response language
    pub language: Option<String>,
    /// Whether tools are offered to the model
    pub enable_tools: Option<bool>,
    /// Whether plans need operator approval
    pub require_plan_approval: Option<bool>,
    /// Whether tools need first-use operator approval
    pub require_tool_approval: Option<bool>,
    /// Whether per-project history/summary persistence is on
    pub session_mode: Option<bool>,
    /// Bytes of recent history kept uncompacted
    pub recent_history_size: Option<u64>,
    /// Per-provider settings
    #[serde(default)]
    pub providers: Providers,
}

/// Per-provider configuration tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Providers {
    pub openai: ProviderEntry,
    pub anthropic: ProviderEntry,
    pub google: ProviderEntry,
    pub ollama: ProviderEntry,
    pub openrouter: ProviderEntry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_type: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("QUILL_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quill")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults on any problem
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Assemble the provider config for one provider, applying environment
    /// fallbacks for credentials and endpoints.
    pub fn provider_config(&self, kind: ProviderKind, model_override: Option<&str>) -> ProviderConfig {
        let entry = match kind {
            ProviderKind::OpenAI => &self.providers.openai,
            ProviderKind::Anthropic => &self.providers.anthropic,
            ProviderKind::Google => &self.providers.google,
            ProviderKind::Ollama => &self.providers.ollama,
            ProviderKind::OpenRouter => &self.providers.openrouter,
        };

        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let (api_key, base_url) = match kind {
            ProviderKind::OpenAI => (
                entry.api_key.clone().or_else(|| env("OPENAI_API_KEY")),
                entry
                    .base_url
                    .clone()
                    .or_else(|| env("OPENAI_PROXY"))
                    .or_else(|| env("OPENAI_API_BASE")),
            ),
            ProviderKind::Anthropic => (
                entry.api_key.clone().or_else(|| env("ANTHROPIC_API_KEY")),
                entry.base_url.clone().or_else(|| env("ANTHROPIC_BASE_URL")),
            ),
            ProviderKind::Google => (
                entry
                    .api_key
                    .clone()
                    .or_else(|| env("GEMINI_API_KEY"))
                    .or_else(|| env("GOOGLE_API_KEY")),
                entry.base_url.clone(),
            ),
            ProviderKind::Ollama => (
                entry.api_key.clone(),
                entry.base_url.clone().or_else(|| env("OLLAMA_HOST")),
            ),
            ProviderKind::OpenRouter => (
                entry.api_key.clone().or_else(|| env("OPENROUTER_API_KEY")),
                entry.base_url.clone(),
            ),
        };

        ProviderConfig {
            api_key,
            model: model_override.map(str::to_string).or_else(|| entry.model.clone()),
            base_url,
            api_type: entry.api_type.clone(),
            azure_endpoint: entry.azure_endpoint.clone(),
            azure_deployment: entry.azure_deployment.clone(),
            azure_api_version: entry.azure_api_version.clone(),
        }
    }

    /// Memory tuning derived from config
    pub fn memory_config(&self) -> MemoryConfig {
        let mut config = MemoryConfig::default();
        if let Some(window) = self.recent_history_size {
            config.recent_window_bytes = window;
        }
        config
    }
}

/// Example config content for `quill config init`
pub fn example_config() -> &'static str {
    r#"# quill configuration file
# Place at ~/.config/quill/config.toml (or set QUILL_CONFIG_PATH)

# Default provider (openai, anthropic, google, ollama, openrouter)
provider = "openai"

# Sampling
temperature = 0.7
max_tokens = 2000

# Tool calling
enable_tools = true
require_plan_approval = true
require_tool_approval = true

# Per-project history persistence
session_mode = true
# recent_history_size = 30480

# API keys can also come from environment variables:
#   OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, OPENROUTER_API_KEY
[providers.openai]
# api_key = "sk-..."
# model = "gpt-4o"
# For Azure deployments:
# api_type = "azure"
# azure_endpoint = "https://myresource.openai.azure.com"
# azure_deployment = "gpt4o"
# azure_api_version = "2024-02-01"

[providers.anthropic]
# api_key = "sk-ant-..."
# model = "claude-sonnet-4-5-20250929"

[providers.google]
# api_key = "..."
# model = "gemini-2.5-flash"

[providers.ollama]
# base_url = "http://localhost:11434"
# model = "llama3.2"

[providers.openrouter]
# api_key = "sk-or-..."
# model = "anthropic/claude-3.5-sonnet"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            provider = "anthropic"
            temperature = 0.3
            require_plan_approval = false
            recent_history_size = 2000

            [providers.anthropic]
            api_key = "sk-ant-test"
            model = "claude-sonnet-4-5-20250929"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.as_deref(), Some("anthropic"));
        assert_eq!(config.require_plan_approval, Some(false));

        let pc = config.provider_config(ProviderKind::Anthropic, None);
        assert_eq!(pc.api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(config.memory_config().recent_window_bytes, 2000);
    }

    #[test]
    fn test_model_override_wins() {
        let config: Config = toml::from_str(
            r#"
            [providers.openai]
            api_key = "k"
            model = "gpt-4o"
            "#,
        )
        .unwrap();
        let pc = config.provider_config(ProviderKind::OpenAI, Some("o3-mini"));
        assert_eq!(pc.model.as_deref(), Some("o3-mini"));
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.provider.as_deref(), Some("openai"));
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.provider.is_none());
        assert!(config.providers.openai.api_key.is_none());
    }
}
