//! Core type definitions for Mosaic orchestration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Security sensitivity of an atom
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl SecurityLevel {
    /// Weight used by the complexity router
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 0.1,
            Self::Medium => 0.5,
            Self::High => 0.8,
            Self::Critical => 1.0,
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid security level: {}", s)),
        }
    }
}

/// Performance expectations of an atom
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Relaxed,
    #[default]
    Standard,
    Critical,
}

impl std::fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relaxed => write!(f, "relaxed"),
            Self::Standard => write!(f, "standard"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for PerformanceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relaxed" | "low" => Ok(Self::Relaxed),
            "standard" | "normal" => Ok(Self::Standard),
            "critical" | "high" => Ok(Self::Critical),
            _ => Err(format!("Invalid performance tier: {}", s)),
        }
    }
}

/// Normalized, hashable description of an atom
///
/// Built by [`crate::SignatureExtractor`]; the fingerprint is always derived
/// from the other fields and is never set by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticSignature {
    /// Normalized purpose: sorted, de-duplicated, stopword-free tokens
    pub purpose: String,
    /// Leading verb of the purpose
    pub intent: String,
    pub inputs: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub domain: String,
    pub constraints: BTreeSet<String>,
    pub security_level: SecurityLevel,
    pub performance_tier: PerformanceTier,
    pub idempotent: bool,
    /// Hex SHA-256 over the canonical fields
    pub fingerprint: String,
}

impl SemanticSignature {
    /// Purpose tokens as a set
    pub fn purpose_tokens(&self) -> BTreeSet<&str> {
        self.purpose.split_whitespace().collect()
    }

    /// I/O keys, prefixed by direction (`in:name`, `out:name`)
    pub fn io_keys(&self) -> BTreeSet<String> {
        self.inputs
            .keys()
            .map(|k| format!("in:{}", k))
            .chain(self.outputs.keys().map(|k| format!("out:{}", k)))
            .collect()
    }

    /// Number of declared inputs and outputs
    pub fn io_count(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    /// Recompute the fingerprint after a field changed
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = crate::signature::fingerprint(self);
    }
}

/// Atom lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomStatus {
    #[default]
    Pending,
    Routed,
    Inferred,
    Validating,
    Completed,
    Failed,
    Retrying,
    Blocked,
}

impl AtomStatus {
    /// Terminal statuses never transition again within a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }
}

impl std::fmt::Display for AtomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Routed => write!(f, "routed"),
            Self::Inferred => write!(f, "inferred"),
            Self::Validating => write!(f, "validating"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Retrying => write!(f, "retrying"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for AtomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "routed" => Ok(Self::Routed),
            "inferred" => Ok(Self::Inferred),
            "validating" => Ok(Self::Validating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid atom status: {}", s)),
        }
    }
}

/// Inference tier, ordered by cost and power
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Light,
    Balanced,
    /// Reserved for extended reasoning
    Heavy,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Light, Tier::Balanced, Tier::Heavy];
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Balanced => write!(f, "balanced"),
            Self::Heavy => write!(f, "heavy"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "balanced" => Ok(Self::Balanced),
            "heavy" => Ok(Self::Heavy),
            _ => Err(format!("Invalid tier: {}", s)),
        }
    }
}

/// Routing decision for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub tier: Tier,
    /// Estimated complexity (0.0 - 1.0)
    pub estimated_complexity: f64,
    pub estimated_cost: f64,
}

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    TimedOut,
    ProviderError,
    Cancelled,
}

/// Record of one inference + validation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt number, starting at 1
    pub number: u32,
    pub tier: Option<Tier>,
    pub outcome: AttemptOutcome,
    pub violations: Vec<String>,
    /// Validation score (0 - 100) when validation ran
    pub score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(number: u32, outcome: AttemptOutcome) -> Self {
        Self {
            number,
            tier: None,
            outcome,
            violations: Vec::new(),
            score: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_violations(mut self, violations: Vec<String>) -> Self {
        self.violations = violations;
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// The smallest unit of generated work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicTask {
    pub id: String,
    pub description: String,
    pub signature: SemanticSignature,
    pub dependencies: BTreeSet<String>,
    pub max_lines: usize,
    pub status: AtomStatus,
    pub attempts: Vec<AttemptRecord>,
    pub code: Option<String>,
    /// Owning module from architecture design
    pub module: Option<String>,
}

pub const DEFAULT_MAX_LINES: usize = 10;

/// Whether an id is safe to use as a file name: `[A-Za-z0-9_.-]+`, no `..`
///
/// Atom and plan ids come from model output and end up in store paths.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains("..")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl AtomicTask {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        signature: SemanticSignature,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            signature,
            dependencies: BTreeSet::new(),
            max_lines: DEFAULT_MAX_LINES,
            status: AtomStatus::Pending,
            attempts: Vec::new(),
            code: None,
            module: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Number of attempts made so far
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Violations of the most recent attempt
    pub fn last_violations(&self) -> &[String] {
        self.attempts
            .last()
            .map(|a| a.violations.as_slice())
            .unwrap_or(&[])
    }
}

/// Result of validating one candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    /// Score (0 - 100)
    pub score: f64,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn pass(score: f64) -> Self {
        Self {
            passed: true,
            score,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn fail(score: f64, violations: Vec<String>) -> Self {
        Self {
            passed: false,
            score,
            violations,
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in ["user-create", "counter_inc.2", "a", "v1.0"] {
            assert!(is_valid_id(id), "{}", id);
        }
        for id in ["", "../x", "a/b", "a\\b", "..", "a..b", "with space", "ä"] {
            assert!(!is_valid_id(id), "{}", id);
        }
    }

    #[test]
    fn test_security_ordering() {
        assert!(SecurityLevel::Low < SecurityLevel::Medium);
        assert!(SecurityLevel::High < SecurityLevel::Critical);
        assert_eq!(SecurityLevel::Critical.weight(), 1.0);
    }

    #[test]
    fn test_atom_status_parsing() {
        let status: AtomStatus = "retrying".parse().unwrap();
        assert_eq!(status, AtomStatus::Retrying);
        assert_eq!(status.to_string(), "retrying");
        assert!("sleeping".parse::<AtomStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AtomStatus::Completed.is_terminal());
        assert!(AtomStatus::Failed.is_terminal());
        assert!(AtomStatus::Blocked.is_terminal());
        assert!(!AtomStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Light < Tier::Balanced);
        assert!(Tier::Balanced < Tier::Heavy);
        assert_eq!("heavy".parse::<Tier>().unwrap(), Tier::Heavy);
    }

    #[test]
    fn test_attempt_record_builder() {
        let record = AttemptRecord::new(2, AttemptOutcome::Rejected)
            .with_tier(Tier::Balanced)
            .with_violations(vec!["too long".to_string()]);
        assert_eq!(record.number, 2);
        assert_eq!(record.tier, Some(Tier::Balanced));
        assert_eq!(record.violations.len(), 1);
        assert!(record.score.is_none());
    }
}
