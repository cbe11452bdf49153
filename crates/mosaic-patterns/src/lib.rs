//! # mosaic-patterns
//!
//! Learned patterns: validated (signature, code) pairs that later atoms can
//! adapt instead of synthesizing from scratch.
//!
//! - Patterns are only stored above a success-rate threshold
//! - Lookup is by signature similarity, never exact match alone
//! - Patterns are never deleted automatically and outlive any single run

mod cache;
pub mod embedding;
mod memory;
mod pattern;

pub use cache::PatternCache;
pub use memory::InMemoryPatternCache;
pub use pattern::{Pattern, PatternMatch};
