//! CLI command implementations

pub mod completions;
pub mod config;
pub mod list;
pub mod node;
pub mod relate;
pub mod schema;
