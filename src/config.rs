//! Configuration system for the agentflow server and CLI
//!
//! Configuration is read once from a TOML file at startup. Secrets are never
//! stored in the file: the LLM section names the environment variable that
//! holds the API key and it is resolved at runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub llm: LlmSection,
    /// Extra catalog entries keyed by agent id
    #[serde(default)]
    pub agents: BTreeMap<String, AgentEntry>,
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// LLM backend section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name ("openai" or "anthropic")
    pub provider: String,
    /// Model identifier
    pub model: String,
    /// Environment variable containing API key
    pub api_key_env: String,
    /// Optional API base URL override
    pub base_url: Option<String>,
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    /// Optional max tokens
    pub max_tokens: Option<u32>,
    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl LlmSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Extra agent profile supplied through configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEntry {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub instructions: String,
}

const SUPPORTED_PROVIDERS: &[&str] = &["openai", "anthropic"];

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid agent ID format: {0}")]
    InvalidAgentId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Unsupported LLM provider '{}', expected one of: {}",
                self.llm.provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }

        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature {temperature} is outside 0.0..=2.0"
                )));
            }
        }

        for (id, entry) in &self.agents {
            validate_agent_id(id)?;
            if entry.instructions.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "Agent '{id}' has empty instructions"
                )));
            }
        }

        Ok(())
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.llm.api_key_env.clone()))
    }

    /// Listen port, honouring the `HTTP_PORT` override
    pub fn listen_port(&self) -> u16 {
        std::env::var("HTTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.server.port)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate agent ID format
pub fn validate_agent_id(agent_id: &str) -> Result<(), ConfigError> {
    let valid_chars = agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if agent_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAgentId(format!(
            "Agent ID '{agent_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
