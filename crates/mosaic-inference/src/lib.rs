//! # mosaic-inference
//!
//! Per-atom inference: estimate complexity, route to a tier, adapt a learned
//! pattern or synthesize from first principles, and reject candidates that
//! break the atom's constraints.

pub mod constraints;
mod engine;
pub mod prompt;
mod router;
mod tiers;

pub use constraints::{ConstraintChecker, ConstraintReport};
pub use engine::{InferenceEngine, InferencePath, Preparation, Synthesis};
pub use router::ComplexityRouter;
pub use tiers::{TierStrategy, TierTable};
