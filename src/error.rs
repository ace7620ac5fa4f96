//! Error types for agent dispatch and pipeline execution
//!
//! Runtime failures fall into three classes: malformed requests, unknown
//! agents and completion backend failures. Each class maps to a transport
//! status class so the HTTP surface and the stage records agree.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for dispatcher and executor operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    #[error("Backend error: {message}")]
    BackendError { message: String },
}

/// Serializable failure class attached to failed stages and error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    UnknownAgent,
    BackendError,
}

impl ErrorKind {
    /// HTTP status class for this failure
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::UnknownAgent => 400,
            ErrorKind::BackendError => 500,
        }
    }
}

impl AgentError {
    /// Failure class used on stage records and at the transport boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            AgentError::UnknownAgent { .. } => ErrorKind::UnknownAgent,
            AgentError::BackendError { .. } => ErrorKind::BackendError,
        }
    }

    /// Human-readable description with secrets and sensitive paths removed
    pub fn description(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Create invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create unknown agent error
    pub fn unknown_agent<S: Into<String>>(agent_id: S) -> Self {
        Self::UnknownAgent {
            agent_id: agent_id.into(),
        }
    }

    /// Create backend error
    pub fn backend_error<S: Into<String>>(message: S) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }
}

impl From<crate::llm::LlmError> for AgentError {
    fn from(err: crate::llm::LlmError) -> Self {
        Self::backend_error(err.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid secret pattern")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("valid path pattern")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Sanitize error messages before they leave the process
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(truncate_suffix);
    }

    sanitized
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
