//! Text generation collaborator.
//!
//! The core only needs "prompt in, narrative out". [`OllamaGenerator`] is the
//! production implementation backed by Ollama's chat API.

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Opaque narrative generator.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Model identifier shown in reports.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Configuration for the Ollama generator.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "qwen2.5:7b".to_string(),
            temperature: 0.7,
            max_tokens: Some(2048),
            timeout_seconds: 120,
        }
    }
}

/// Message in the chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Generator that calls a local or remote Ollama server.
pub struct OllamaGenerator {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        info!(
            "Using model {} at {}",
            config.model_name, config.ollama_url
        );

        Ok(Self {
            config,
            http_client,
        })
    }

    fn request<'a>(&'a self, prompt: &str) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: &self.config.model_name,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_MESSAGE.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));
        let started = Instant::now();

        debug!("Sending prompt of {} chars to {}", prompt.len(), url);

        let response = self
            .http_client
            .post(&url)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        seconds: self.config.timeout_seconds,
                    }
                } else if e.is_connect() {
                    GenerationError::Connect {
                        url: self.config.ollama_url.clone(),
                    }
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        info!(
            "Generation finished in {:.1}s",
            started.elapsed().as_secs_f64()
        );

        let content = chat_response.message.content;
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// System message sent alongside every analysis prompt.
const SYSTEM_MESSAGE: &str = r#"You are an operations analytics assistant.
Answer strictly from the data provided in the prompt.
When a figure is derived, show how it was calculated."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.max_tokens, Some(2048));
    }

    #[test]
    fn test_request_shape() {
        let generator = OllamaGenerator::new(OllamaConfig {
            max_tokens: None,
            ..OllamaConfig::default()
        })
        .unwrap();
        let json = serde_json::to_value(generator.request("hello")).unwrap();

        assert_eq!(json["model"], "qwen2.5:7b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!(json["options"].get("num_predict").is_none());
    }

    #[test]
    fn test_unreachable_server_is_a_connect_error() {
        let generator = OllamaGenerator::new(OllamaConfig {
            ollama_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 5,
            ..OllamaConfig::default()
        })
        .unwrap();

        let result = tokio_test::block_on(generator.generate("ping"));
        assert!(matches!(
            result,
            Err(GenerationError::Connect { .. })
                | Err(GenerationError::Transport(_))
                | Err(GenerationError::Timeout { .. })
        ));
    }
}
