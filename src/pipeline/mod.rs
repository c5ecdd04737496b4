//! Opportunity pipeline.
//!
//! Every inbound email flows through:
//! 1. `normalizer::normalize()`: markup to text plus opportunity URLs, no LLM
//! 2. `Classifier::classify()`: candidates with a preliminary match decision
//! 3. `ResearchAgent::research()`: evidence per matched candidate, batched
//! 4. `Verifier::verify()`: re-check each researched candidate against evidence
//! 5. `aggregator::aggregate()`: attach evidence, summarise
//!
//! `workflow::Pipeline` sequences the stages and skips 3 to 5 when nothing matched.

pub mod aggregator;
pub mod classifier;
pub mod fields;
pub mod normalizer;
pub mod types;
pub mod verifier;
pub mod workflow;

pub use workflow::{Pipeline, PipelineDeps, run_pipeline};
