//! # mosaic-core
//!
//! Core types for the Mosaic task-decomposition and orchestration engine.
//!
//! Mosaic breaks a specification into atoms: small, single-responsibility
//! units of generated code, each described by a semantic signature.
//!
//! ## Core Paradigm
//!
//! - Atoms ARE the unit of work (bounded line count, one responsibility)
//! - Signatures ARE the cache key (similarity, not exact match)
//! - Dependencies ARE graph levels (atoms in a level never depend on each other)
//! - Validated code IS learning state (patterns outlive any single run)

pub mod config;
mod error;
pub mod fail_open;
pub mod signature;
mod types;

pub use config::MosaicConfig;
pub use error::{MosaicError, Result};
pub use signature::{fingerprint, similarity, SignatureExtractor, SignatureHints};
pub use types::*;
