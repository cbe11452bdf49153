//! # mosaic-validation
//!
//! Ensemble validation for generated atoms.
//!
//! Several independent checks vote on a candidate; the ensemble accepts it
//! when enough of them agree and the combined score clears the pass mark.
//! Built-in checks are static analyses of the code; external checks (model
//! review, test runners) plug in through [`ExternalCheck`].

mod checks;
mod ensemble;

pub use checks::{CheckResult, ExternalCheck, ReviewCheck, ValidationCheck};
pub use ensemble::{EnsembleValidator, ValidationReport};
