//! Mock implementations for testing
//!
//! Provides a mock `LlmProvider` and a scripted `CompletionBackend` so the
//! dispatcher, executor and HTTP surface can be tested without network access.

use crate::catalog::AgentCatalog;
use crate::llm::backend::CompletionBackend;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Mock LLM provider for testing
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub current_response: Arc<Mutex<usize>>,
    pub should_fail: bool,
    pub omit_content: bool,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// A provider whose responses carry no text content
    pub fn without_content() -> Self {
        Self {
            omit_content: true,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().await.push(request);

        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let mut current = self.current_response.lock().await;
        let response_idx = *current % self.responses.len().max(1);
        *current += 1;

        let content = if self.omit_content {
            None
        } else if self.responses.is_empty() {
            Some("Mock response".to_string())
        } else {
            Some(self.responses[response_idx].clone())
        };

        Ok(CompletionResponse {
            content,
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
        })
    }
}

/// One call observed by a `ScriptedBackend`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub system_directive: String,
    pub user_content: String,
}

type Fallback = dyn Fn(&str, &str) -> Result<String, LlmError> + Send + Sync;

/// Completion backend with canned replies keyed by system directive.
///
/// Replies queued for a directive are consumed in order. Once a directive's
/// queue is empty the fallback handles the call, or the call fails with
/// `RequestFailed` when no fallback is set.
#[derive(Default)]
pub struct ScriptedBackend {
    script: std::sync::Mutex<HashMap<String, VecDeque<Result<String, LlmError>>>>,
    fallback: Option<Box<Fallback>>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn builtin_directive(agent_id: &str) -> String {
        AgentCatalog::builtin()
            .lookup(agent_id)
            .map(|p| p.instructions.clone())
            .unwrap_or_else(|| panic!("no built-in agent {agent_id}"))
    }

    fn push(self, directive: String, reply: Result<String, LlmError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.entry(directive).or_default().push_back(reply);
        }
        self
    }

    /// Queue a reply for calls made with a built-in agent's directive
    pub fn respond(self, agent_id: &str, text: impl Into<String>) -> Self {
        let directive = Self::builtin_directive(agent_id);
        self.push(directive, Ok(text.into()))
    }

    /// Queue a failure for calls made with a built-in agent's directive
    pub fn fail(self, agent_id: &str, error: LlmError) -> Self {
        let directive = Self::builtin_directive(agent_id);
        self.push(directive, Err(error))
    }

    /// Queue a reply for an arbitrary directive
    pub fn respond_to_directive(self, directive: &str, text: impl Into<String>) -> Self {
        self.push(directive.to_string(), Ok(text.into()))
    }

    /// Handle unscripted calls with `f(system_directive, user_content)`
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Hold every call until the semaphore grants a permit. Calls are
    /// recorded before they wait.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    fn next_reply(&self, system_directive: &str) -> Option<Result<String, LlmError>> {
        self.script
            .lock()
            .ok()?
            .get_mut(system_directive)?
            .pop_front()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        system_directive: &str,
        user_content: &str,
    ) -> Result<String, LlmError> {
        self.calls.lock().await.push(RecordedCall {
            system_directive: system_directive.to_string(),
            user_content: user_content.to_string(),
        });

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            permit.forget();
        }

        match self.next_reply(system_directive) {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(f) => f(system_directive, user_content),
                None => Err(LlmError::RequestFailed(
                    "no scripted response for directive".to_string(),
                )),
            },
        }
    }
}
