//! Sequential agent pipelines
//!
//! `stage` holds the run record and its state machine; `executor` drives a
//! run through the dispatcher.

pub mod executor;
pub mod stage;

pub use executor::{
    cancellation, CancelHandle, CancelSignal, PipelineExecutor, PipelineReport, RunHandle,
    SNAPSHOT_BUFFER,
};
pub use stage::{PipelineRun, RunState, Stage, StageStatus};
