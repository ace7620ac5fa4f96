//! LLM provider abstraction and trait definitions
//!
//! This module defines the core traits and types for LLM provider interactions,
//! enabling multiple provider backends with a unified interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Message roles in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// LLM completion request parameters
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Build a request with a fixed system directive and a single user turn
    pub fn directed(
        model: impl Into<String>,
        system_directive: impl Into<String>,
        user_content: impl Into<String>,
    ) -> Self {
        Self {
            messages: vec![Message::system(system_directive), Message::user(user_content)],
            model: model.into(),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// LLM completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why completion finished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// LLM provider trait for dependency injection and testing
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Get list of available models for this provider
    fn available_models(&self) -> Vec<String>;

    /// Generate a completion from the given request
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// LLM provider errors
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("API error: {0}")]
    ApiError(String),
}

impl LlmError {
    /// Classify a reqwest transport failure
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else {
            LlmError::NetworkError(format!(
                "HTTP request failed: {} (is_connect: {}, is_request: {})",
                err,
                err.is_connect(),
                err.is_request()
            ))
        }
    }

    /// Classify a non-success HTTP status from a provider API
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{provider} API error: {status} - {body}");
        match status.as_u16() {
            401 | 403 => LlmError::AuthenticationFailed(message),
            429 => LlmError::RateLimitExceeded(message),
            _ => LlmError::ApiError(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directed_request_layout() {
        let request = CompletionRequest::directed("gpt-4o-mini", "You are terse.", "Hello!");

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[0].content, "You are terse.");
        assert_eq!(request.messages[1].role, MessageRole::User);
        assert_eq!(request.messages[1].content, "Hello!");
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, None);
    }

    #[test]
    fn test_token_usage_default() {
        let usage = TokenUsage::default();
        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_tokens, 0);
    }

    #[test]
    fn test_llm_error_display() {
        let errors = vec![
            LlmError::NotConfigured("test".to_string()),
            LlmError::AuthenticationFailed("test".to_string()),
            LlmError::RateLimitExceeded("test".to_string()),
            LlmError::RequestFailed("test".to_string()),
            LlmError::InvalidResponse("test".to_string()),
            LlmError::NetworkError("test".to_string()),
            LlmError::Timeout("test".to_string()),
            LlmError::ApiError("test".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            LlmError::from_status("OpenAI", reqwest::StatusCode::UNAUTHORIZED, ""),
            LlmError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            LlmError::from_status("OpenAI", reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            LlmError::from_status("OpenAI", reqwest::StatusCode::BAD_GATEWAY, "upstream"),
            LlmError::ApiError(_)
        ));
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::System).unwrap(),
            "\"system\""
        );
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
