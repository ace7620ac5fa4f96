//! Agent dispatcher
//!
//! Turns one `(agent_id, input)` pair into one completion call using the
//! agent's catalog instructions as the system directive.

use crate::catalog::AgentCatalog;
use crate::error::{AgentError, AgentResult};
use crate::llm::CompletionBackend;
use crate::dispatch_span;
use crate::observability::metrics::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn, Instrument};

/// Resolves agent identifiers and performs exactly one backend call per dispatch
#[derive(Clone)]
pub struct AgentDispatcher {
    catalog: Arc<AgentCatalog>,
    backend: Arc<dyn CompletionBackend>,
}

impl AgentDispatcher {
    pub fn new(catalog: Arc<AgentCatalog>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self { catalog, backend }
    }

    pub fn catalog(&self) -> &Arc<AgentCatalog> {
        &self.catalog
    }

    /// Run `input` through the agent's directive and return the produced text verbatim.
    ///
    /// No retries and no caching: two identical calls issue two backend
    /// requests and may legitimately return different text. A completion that
    /// is empty or whitespace-only is reported as a `BackendError` so it can
    /// never become the next stage's input.
    pub async fn dispatch(&self, agent_id: &str, input: &str) -> AgentResult<String> {
        let span = dispatch_span!(agent_id = %agent_id, input_len = input.len());
        self.dispatch_once(agent_id, input).instrument(span).await
    }

    async fn dispatch_once(&self, agent_id: &str, input: &str) -> AgentResult<String> {
        if agent_id.trim().is_empty() {
            return Err(AgentError::invalid_request("agentId is required"));
        }
        if input.trim().is_empty() {
            return Err(AgentError::invalid_request("input is required"));
        }

        let profile = self.catalog.lookup(agent_id).ok_or_else(|| {
            metrics().unknown_agent_rejected();
            warn!(agent_id = %agent_id, "Dispatch requested for unknown agent");
            AgentError::unknown_agent(agent_id)
        })?;

        let collector = metrics();
        collector.dispatch_started(agent_id);
        let started = Instant::now();

        let result = self.backend.complete(&profile.instructions, input).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) if output.trim().is_empty() => {
                collector.dispatch_failed(agent_id, elapsed_ms);
                warn!(agent_id = %agent_id, "Completion backend returned empty output");
                Err(AgentError::backend_error(
                    "completion backend returned empty output",
                ))
            }
            Ok(output) => {
                collector.dispatch_succeeded(agent_id, elapsed_ms);
                debug!(
                    agent_id = %agent_id,
                    output_len = output.len(),
                    elapsed_ms,
                    "Dispatch completed"
                );
                Ok(output)
            }
            Err(e) => {
                collector.dispatch_failed(agent_id, elapsed_ms);
                warn!(agent_id = %agent_id, error = %e, elapsed_ms, "Completion backend failed");
                Err(e.into())
            }
        }
    }
}
