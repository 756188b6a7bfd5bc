//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.opsight.toml` files.

use crate::models::{Domain, Language};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".opsight.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Conversation memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path. Empty means stdout.
    #[serde(default)]
    pub output: String,

    /// Default caller id for conversation memory.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Largest data file accepted by the directory scanner, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: String::new(),
            user_id: default_user_id(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_user_id() -> String {
    crate::service::DEFAULT_USER.to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<usize>,

    /// Generation deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts after a failed generation.
    #[serde(default)]
    pub retries: usize,

    /// Replaces the built-in analyst preamble of the prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            retries: 0,
            system_prompt: None,
        }
    }
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> Option<usize> {
    Some(2048)
}

fn default_timeout() -> u64 {
    120
}

/// Analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Trailing window in months for domain summaries.
    #[serde(default = "default_window_months")]
    pub window_months: u32,

    /// Prompt, message and chart-title language.
    #[serde(default)]
    pub language: Language,

    /// Extra topic keywords per domain, added to the built-in tables.
    #[serde(default)]
    pub keywords: KeywordConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_months: default_window_months(),
            language: Language::default(),
            keywords: KeywordConfig::default(),
        }
    }
}

fn default_window_months() -> u32 {
    1
}

/// Extra keywords, one list per domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default)]
    pub production: Vec<String>,
    #[serde(default)]
    pub sales: Vec<String>,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub feedback: Vec<String>,
}

impl KeywordConfig {
    pub fn for_domain(&self, domain: Domain) -> &[String] {
        match domain {
            Domain::Production => &self.production,
            Domain::Sales => &self.sales,
            Domain::Inventory => &self.inventory,
            Domain::Feedback => &self.feedback,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Messages kept per caller (sliding window).
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(language) = args.language {
            self.analysis.language = language;
        }
        if let Some(window) = args.window_months {
            self.analysis.window_months = window;
        }

        if let Some(ref user) = args.user {
            self.general.user_id = user.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.to_string_lossy().to_string();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "qwen2.5:7b");
        assert_eq!(config.analysis.window_months, 1);
        assert_eq!(config.analysis.language, Language::Zh);
        assert_eq!(config.memory.max_messages, 20);
        assert_eq!(config.general.user_id, "default_user");
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "analysis.md"

[model]
name = "llama3.2:latest"
temperature = 0.2
retries = 2

[analysis]
window_months = 3
language = "en"

[analysis.keywords]
inventory = ["warehouse", "仓库"]

[memory]
max_messages = 8
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "analysis.md");
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.model.retries, 2);
        assert_eq!(config.model.timeout_seconds, 120);
        assert_eq!(config.analysis.window_months, 3);
        assert_eq!(config.analysis.language, Language::En);
        assert_eq!(
            config.analysis.keywords.for_domain(Domain::Inventory),
            ["warehouse", "仓库"]
        );
        assert!(config.analysis.keywords.for_domain(Domain::Sales).is_empty());
        assert_eq!(config.memory.max_messages, 8);
    }

    #[test]
    fn test_merge_with_args() {
        let args = crate::cli::Args::try_parse_from([
            "opsight",
            "--dashboard",
            "--model",
            "mistral",
            "--timeout",
            "30",
            "--language",
            "en",
            "--user",
            "bob",
        ])
        .unwrap();

        let mut config = Config::default();
        config.model.retries = 4;
        config.merge_with_args(&args);

        assert_eq!(config.model.name, "mistral");
        assert_eq!(config.model.timeout_seconds, 30);
        assert_eq!(config.model.retries, 4);
        assert_eq!(config.analysis.language, Language::En);
        assert_eq!(config.general.user_id, "bob");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[memory]"));
        assert!(!toml_str.contains("verbose"));
    }

    #[test]
    fn test_legacy_verbose_key_is_ignored() {
        let config: Config = toml::from_str("[general]\nverbose = true\nuser_id = \"dana\"\n").unwrap();
        assert_eq!(config.general.user_id, "dana");
    }
}
