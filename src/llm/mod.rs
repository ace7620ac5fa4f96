//! LLM integration for agent dispatch
//!
//! This module provides a provider-agnostic interface for LLM interactions
//! (OpenAI, Anthropic) and the narrow completion seam the dispatcher uses.

pub mod backend;
pub mod provider;
pub mod providers;

pub use backend::{CompletionBackend, ModelSettings, ProviderBackend};
pub use provider::*;
pub use providers::*;
