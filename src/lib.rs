//! Opportunity Scout: find opportunities in inbound email, research them on
//! the web and re-verify each match against what was found.

pub mod config;
pub mod email;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod research;
pub mod tools;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::types::{Candidate, EmailInput, EvidenceRecord, WorkflowEvent, WorkflowPhase, WorkflowRun};
pub use pipeline::{Pipeline, PipelineDeps, run_pipeline};
