//! Completion backend seam used by the agent dispatcher
//!
//! The dispatcher only needs `complete(system_directive, user_content) -> text`.
//! `ProviderBackend` adapts any `LlmProvider` to that shape using the model
//! settings from configuration.

use crate::config::LlmSection;
use crate::llm::provider::{CompletionRequest, LlmError, LlmProvider};
use async_trait::async_trait;
use std::sync::Arc;

/// Single-shot text completion capability
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Produce text for `user_content` under the fixed `system_directive`
    async fn complete(&self, system_directive: &str, user_content: &str)
        -> Result<String, LlmError>;
}

/// Model parameters applied to every request a `ProviderBackend` issues
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl From<&LlmSection> for ModelSettings {
    fn from(section: &LlmSection) -> Self {
        Self {
            model: section.model.clone(),
            temperature: section.temperature,
            max_tokens: section.max_tokens,
        }
    }
}

/// `CompletionBackend` backed by an `LlmProvider`
pub struct ProviderBackend {
    provider: Arc<dyn LlmProvider>,
    settings: ModelSettings,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: ModelSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    async fn complete(
        &self,
        system_directive: &str,
        user_content: &str,
    ) -> Result<String, LlmError> {
        let mut request =
            CompletionRequest::directed(&self.settings.model, system_directive, user_content);
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;

        let response = self.provider.complete(request).await?;
        response.content.ok_or_else(|| {
            LlmError::InvalidResponse(format!(
                "{} returned no text content",
                self.provider.name()
            ))
        })
    }
}
