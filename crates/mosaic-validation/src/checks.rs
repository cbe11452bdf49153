//! Individual validation checks

use async_trait::async_trait;
use mosaic_agent::{InferenceProvider, InferenceRole};
use mosaic_core::{AtomicTask, Result};
use mosaic_inference::constraints;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Types of validation checks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    /// Parses as Rust
    Structure,
    /// Within the atom's line budget
    LineLimit,
    /// Declared inputs used, declared output types produced
    IoContract,
    /// No todo!/unimplemented!/TODO/FIXME/elided code
    Placeholders,
    /// One function, bounded statement count
    SingleResponsibility,
    /// Check supplied through [`ExternalCheck`]
    External(String),
}

impl ValidationCheck {
    pub const BUILTIN: [ValidationCheck; 5] = [
        ValidationCheck::Structure,
        ValidationCheck::LineLimit,
        ValidationCheck::IoContract,
        ValidationCheck::Placeholders,
        ValidationCheck::SingleResponsibility,
    ];

    /// A failed blocking check rejects the candidate regardless of votes
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Structure | Self::LineLimit | Self::Placeholders)
    }
}

impl std::fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structure => write!(f, "structure"),
            Self::LineLimit => write!(f, "line_limit"),
            Self::IoContract => write!(f, "io_contract"),
            Self::Placeholders => write!(f, "placeholders"),
            Self::SingleResponsibility => write!(f, "single_responsibility"),
            Self::External(name) => write!(f, "external/{}", name),
        }
    }
}

/// Result of a single validation check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: ValidationCheck,
    pub passed: bool,
    /// Score (0.0 - 1.0)
    pub score: f64,
    pub details: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl CheckResult {
    pub fn pass(check: ValidationCheck, details: impl Into<String>) -> Self {
        Self {
            check,
            passed: true,
            score: 1.0,
            details: details.into(),
            warnings: Vec::new(),
        }
    }

    pub fn fail(check: ValidationCheck, score: f64, details: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            score: score.clamp(0.0, 1.0),
            details: details.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// A check run outside the built-in static analysis
#[async_trait]
pub trait ExternalCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, task: &AtomicTask, code: &str) -> Result<CheckResult>;
}

/// Run one built-in check
pub(crate) fn run_builtin(
    check: &ValidationCheck,
    task: &AtomicTask,
    code: &str,
    parsed: Option<&syn::File>,
    parse_error: Option<&str>,
    max_statements: usize,
) -> CheckResult {
    match check {
        ValidationCheck::Structure => match parse_error {
            None => CheckResult::pass(check.clone(), "parses as Rust"),
            Some(e) => CheckResult::fail(check.clone(), 0.0, format!("does not parse as Rust: {}", e)),
        },
        ValidationCheck::LineLimit => {
            let lines = constraints::code_lines(code);
            if lines <= task.max_lines {
                CheckResult::pass(check.clone(), format!("{} of {} lines", lines, task.max_lines))
            } else {
                CheckResult::fail(
                    check.clone(),
                    task.max_lines as f64 / lines as f64,
                    format!("{} lines of code exceeds the limit of {}", lines, task.max_lines),
                )
            }
        }
        ValidationCheck::IoContract => {
            let declared = task.signature.io_count();
            let missing = constraints::missing_io(code, task);
            if missing.is_empty() {
                CheckResult::pass(check.clone(), format!("{} declared inputs/outputs present", declared))
            } else {
                let present = declared.saturating_sub(missing.len());
                CheckResult::fail(check.clone(), present as f64 / declared as f64, missing.join("; "))
            }
        }
        ValidationCheck::Placeholders => {
            let markers = constraints::placeholder_markers(code);
            if markers.is_empty() {
                CheckResult::pass(check.clone(), "no placeholders")
            } else {
                CheckResult::fail(
                    check.clone(),
                    0.0,
                    format!("contains placeholders: {}", markers.join(", ")),
                )
            }
        }
        ValidationCheck::SingleResponsibility => {
            let Some(file) = parsed else {
                return CheckResult::fail(check.clone(), 0.0, "cannot analyse unparsed code");
            };

            let functions = constraints::function_count(file);
            let statements = constraints::statement_count(file);
            let mut problems: Vec<String> = constraints::conjunctions(&task.description)
                .into_iter()
                .map(|w| format!("description contains '{}'", w))
                .collect();
            if functions > 1 {
                problems.push(format!("defines {} functions", functions));
            }
            if statements > max_statements {
                problems.push(format!(
                    "{} statements exceeds the limit of {}",
                    statements, max_statements
                ));
            }

            if problems.is_empty() {
                CheckResult::pass(
                    check.clone(),
                    format!("{} function(s), {} statements", functions, statements),
                )
            } else {
                CheckResult::fail(check.clone(), 0.5 / problems.len() as f64, problems.join("; "))
            }
        }
        ValidationCheck::External(name) => CheckResult::fail(
            check.clone(),
            0.0,
            format!("external check '{}' is not built in", name),
        ),
    }
}

/// Model-backed review through the provider's Review role
///
/// The reviewer must answer starting with PASS or FAIL; anything else counts
/// as a failed review.
pub struct ReviewCheck {
    provider: Arc<dyn InferenceProvider>,
}

impl ReviewCheck {
    pub fn new(provider: Arc<dyn InferenceProvider>) -> Self {
        Self { provider }
    }

    fn prompt(task: &AtomicTask, code: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("# REVIEW ATOM {}\n\n", task.id));
        prompt.push_str("## TASK\n\n");
        prompt.push_str(&task.description);
        prompt.push_str("\n\n## CODE\n\n```rust\n");
        prompt.push_str(code.trim_end());
        prompt.push_str("\n```\n\n");
        prompt.push_str("Does the code implement the task correctly and nothing more?\n");
        prompt.push_str("Answer `PASS` or `FAIL` on the first line, then one reason per line.\n");
        prompt
    }
}

#[async_trait]
impl ExternalCheck for ReviewCheck {
    fn name(&self) -> &str {
        "review"
    }

    async fn check(&self, task: &AtomicTask, code: &str) -> Result<CheckResult> {
        let response = self
            .provider
            .infer(&Self::prompt(task, code), InferenceRole::Review)
            .await?;

        let mut lines = response.lines().map(str::trim).filter(|l| !l.is_empty());
        let verdict = lines.next().unwrap_or_default().to_uppercase();
        let reasons: Vec<&str> = lines.collect();
        let check = ValidationCheck::External(self.name().to_string());

        Ok(if verdict.starts_with("PASS") {
            CheckResult::pass(check, "reviewer approved").with_warnings(
                reasons.iter().map(|r| r.to_string()).collect(),
            )
        } else {
            let details = if reasons.is_empty() {
                format!("reviewer rejected: {}", verdict)
            } else {
                format!("reviewer rejected: {}", reasons.join("; "))
            };
            CheckResult::fail(check, 0.0, details)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_agent::FnProvider;
    use mosaic_core::{SignatureExtractor, SignatureHints};

    fn task() -> AtomicTask {
        let sig = SignatureExtractor::new()
            .extract_with(
                "Negate a flag",
                SignatureHints::new().input("flag", "bool").output("negated", "bool"),
            )
            .unwrap();
        AtomicTask::new("atom-neg", "Negate a flag", sig)
    }

    fn run(check: ValidationCheck, code: &str) -> CheckResult {
        let parsed = constraints::parse(code);
        run_builtin(
            &check,
            &task(),
            code,
            parsed.as_ref().ok(),
            parsed.as_ref().err().map(String::as_str),
            8,
        )
    }

    #[test]
    fn test_builtin_checks_pass_clean_code() {
        let code = "fn negate(flag: bool) -> bool { !flag }";
        for check in ValidationCheck::BUILTIN {
            let result = run(check.clone(), code);
            assert!(result.passed, "{} failed: {}", check, result.details);
            assert_eq!(result.score, 1.0);
        }
    }

    #[test]
    fn test_io_contract_partial_score() {
        let result = run(ValidationCheck::IoContract, "fn negate(x: bool) -> bool { !x }");
        assert!(!result.passed);
        assert!((result.score - 0.5).abs() < 1e-9);
        assert!(result.details.contains("`flag`"));
    }

    #[test]
    fn test_single_responsibility_needs_parse() {
        let result = run(ValidationCheck::SingleResponsibility, "fn negate(");
        assert!(!result.passed);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_single_responsibility_rejects_conjunction() {
        let sig = SignatureExtractor::new()
            .extract_with(
                "Negate then log a flag",
                SignatureHints::new().input("flag", "bool").output("negated", "bool"),
            )
            .unwrap();
        let joined = AtomicTask::new("atom-neg-log", "Negate then log a flag", sig);
        let code = "fn negate(flag: bool) -> bool { !flag }";
        let parsed = constraints::parse(code);

        let result = run_builtin(
            &ValidationCheck::SingleResponsibility,
            &joined,
            code,
            parsed.as_ref().ok(),
            None,
            8,
        );
        assert!(!result.passed);
        assert!(result.details.contains("description contains 'then'"));
    }

    #[test]
    fn test_blocking_checks() {
        assert!(ValidationCheck::Structure.is_blocking());
        assert!(ValidationCheck::Placeholders.is_blocking());
        assert!(ValidationCheck::LineLimit.is_blocking());
        assert!(!ValidationCheck::IoContract.is_blocking());
        assert_eq!(
            ValidationCheck::External("review".to_string()).to_string(),
            "external/review"
        );
    }

    #[tokio::test]
    async fn test_review_check_parses_verdict() {
        let approve = ReviewCheck::new(Arc::new(FnProvider::fixed("PASS\nlooks right")));
        let result = approve.check(&task(), "fn negate(flag: bool) -> bool { !flag }").await.unwrap();
        assert!(result.passed);
        assert_eq!(result.warnings, vec!["looks right".to_string()]);

        let reject = ReviewCheck::new(Arc::new(FnProvider::fixed("FAIL\nreturns input unchanged")));
        let result = reject.check(&task(), "fn negate(flag: bool) -> bool { flag }").await.unwrap();
        assert!(!result.passed);
        assert!(result.details.contains("returns input unchanged"));
    }
}
