//! Tool abstraction for agent capabilities.

pub mod registry;
pub mod tavily;
pub mod tool;
pub mod web;

pub use registry::ToolRegistry;
pub use tool::*;
pub use web::{ExtractedPage, SearchHit, SearchQuery, WebSearch};
