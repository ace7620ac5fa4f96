//! agentflow - sequential LLM agent pipelines
//!
//! Compose named agents, each a fixed instruction profile applied through
//! one text-completion call, into a pipeline where every agent's output
//! becomes the next agent's input.
//!
//! # Overview
//!
//! - [`catalog`]: immutable agent id → instruction profile mapping
//! - [`dispatcher`]: one agent, one completion call
//! - [`pipeline`]: stage state machine and the sequential executor with
//!   live snapshots, stop-on-first-failure and cancellation
//! - [`llm`]: completion backend seam plus OpenAI and Anthropic providers
//! - [`progress`]: status board and conversation projections of a run
//! - [`server`]: warp HTTP API
//!
//! # Quick Start
//!
//! ```rust
//! use agentflow::catalog::AgentCatalog;
//! use agentflow::dispatcher::AgentDispatcher;
//! use agentflow::pipeline::{PipelineExecutor, RunState};
//! use agentflow::testing::ScriptedBackend;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = Arc::new(
//!     ScriptedBackend::new()
//!         .respond("research", "facts")
//!         .respond("summary", "brief"),
//! );
//! let dispatcher = AgentDispatcher::new(Arc::new(AgentCatalog::builtin().clone()), backend);
//! let executor = PipelineExecutor::new(Arc::new(dispatcher));
//!
//! let report = executor
//!     .run_to_completion(vec!["research".into(), "summary".into()], "topic".into())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(report.run.state, RunState::Succeeded);
//! assert_eq!(report.run.final_output(), Some("brief"));
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod testing;

pub use catalog::{AgentCatalog, AgentProfile};
pub use config::{AppConfig, ConfigError};
pub use dispatcher::AgentDispatcher;
pub use error::{AgentError, AgentResult, ErrorKind};
pub use pipeline::{PipelineExecutor, PipelineReport, PipelineRun, RunState, Stage, StageStatus};
