//! Evidence research: a bounded search/extract loop per matched candidate.

pub mod agent;
pub mod strategy;
pub mod synonyms;
pub mod validation;

pub use agent::{ResearchAgent, ResearchOutcome};
