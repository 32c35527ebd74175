//! Application layer: the pipeline orchestrator.

pub mod pipeline;

pub use pipeline::{
    FailureCategory, Pipeline, PipelineFailure, PipelineRequest, PipelineState,
};
