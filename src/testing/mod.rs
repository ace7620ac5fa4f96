//! Testing utilities and mock implementations
//!
//! Mock providers and backends for exercising dispatch and pipelines without
//! calling a real LLM API.

pub mod mocks;

pub use mocks::*;
