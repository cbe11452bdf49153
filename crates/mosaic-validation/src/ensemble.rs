//! Ensemble vote over independent checks
//!
//! Every check casts one vote. A candidate passes when:
//! - no blocking check failed,
//! - at least `ceil(total * agreement)` checks passed,
//! - the average check score (as 0-100) reaches `pass_score`.

use futures::future::join_all;
use mosaic_core::config::ValidationConfig;
use mosaic_core::{AtomicTask, ValidationResult};
use mosaic_inference::constraints;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::checks::{run_builtin, CheckResult, ExternalCheck, ValidationCheck};

/// Ensemble outcome with the per-check breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub result: ValidationResult,
    pub checks: Vec<CheckResult>,
    pub votes_for: usize,
    pub votes_against: usize,
    pub min_votes: usize,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.result.passed
    }

    pub fn score(&self) -> f64 {
        self.result.score
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

pub struct EnsembleValidator {
    config: ValidationConfig,
    max_statements: usize,
    builtin: Vec<ValidationCheck>,
    external: Vec<Arc<dyn ExternalCheck>>,
}

impl EnsembleValidator {
    pub fn new(config: &ValidationConfig, max_statements: usize) -> Self {
        Self {
            config: config.clone(),
            max_statements,
            builtin: ValidationCheck::BUILTIN.to_vec(),
            external: Vec::new(),
        }
    }

    /// Add an external voter
    pub fn with_check(mut self, check: Arc<dyn ExternalCheck>) -> Self {
        self.external.push(check);
        self
    }

    /// Calculate minimum passing votes for an ensemble of `total` checks
    pub fn min_votes(&self, total: usize) -> usize {
        ((total as f64) * self.config.agreement).ceil() as usize
    }

    /// Built-in checks over one parse of the candidate
    ///
    /// Kept synchronous: syn trees are not `Send` and must not live across
    /// an await point.
    fn run_builtins(&self, task: &AtomicTask, code: &str) -> Vec<CheckResult> {
        let parsed = constraints::parse(code);
        self.builtin
            .iter()
            .map(|check| {
                run_builtin(
                    check,
                    task,
                    code,
                    parsed.as_ref().ok(),
                    parsed.as_ref().err().map(String::as_str),
                    self.max_statements,
                )
            })
            .collect()
    }

    /// Run every check and combine the votes
    #[instrument(skip(self, task, code), fields(atom = %task.id))]
    pub async fn validate(&self, task: &AtomicTask, code: &str) -> ValidationReport {
        let mut checks = self.run_builtins(task, code);

        let external = join_all(self.external.iter().map(|check| async move {
            match check.check(task, code).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(check = check.name(), error = %e, "External check errored");
                    CheckResult::fail(
                        ValidationCheck::External(check.name().to_string()),
                        0.0,
                        format!("check errored: {}", e),
                    )
                }
            }
        }))
        .await;
        checks.extend(external);

        self.combine(checks)
    }

    fn combine(&self, checks: Vec<CheckResult>) -> ValidationReport {
        let total = checks.len();
        let min_votes = self.min_votes(total);
        let votes_for = checks.iter().filter(|c| c.passed).count();
        let votes_against = total - votes_for;

        let score = if total == 0 {
            0.0
        } else {
            checks.iter().map(|c| c.score).sum::<f64>() / total as f64 * 100.0
        };

        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut vetoed = false;
        for check in &checks {
            warnings.extend(check.warnings.iter().cloned());
            if !check.passed {
                vetoed |= check.check.is_blocking();
                violations.push(format!("{}: {}", check.check, check.details));
            }
        }
        warnings.sort();
        warnings.dedup();

        if total > 0 && votes_for < min_votes {
            violations.push(format!(
                "ensemble: {} of {} checks passed, {} required",
                votes_for, total, min_votes
            ));
        }
        if score < self.config.pass_score {
            violations.push(format!(
                "ensemble: score {:.1} below pass mark {:.1}",
                score, self.config.pass_score
            ));
        }

        let passed = total > 0 && !vetoed && votes_for >= min_votes && score >= self.config.pass_score;
        let mut result = if passed {
            // Non-blocking failures stay visible on an accepted candidate
            let mut result = ValidationResult::pass(score);
            warnings.extend(violations);
            result.warnings = warnings;
            result
        } else {
            let mut result = ValidationResult::fail(score, violations);
            result.warnings = warnings;
            result
        };
        result.score = (result.score * 10.0).round() / 10.0;

        debug!(
            passed,
            score = result.score,
            votes_for,
            votes_against,
            min_votes,
            "Ensemble verdict"
        );

        ValidationReport {
            result,
            checks,
            votes_for,
            votes_against,
            min_votes,
        }
    }
}
