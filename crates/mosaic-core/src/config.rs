//! Configuration management for Mosaic
//!
//! Thresholds for pattern reuse, routing and validation are initial defaults
//! that get calibrated per deployment, so all of them live here rather than
//! in constants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{MosaicError, Result, Tier};

/// Repository-level Mosaic configuration
///
/// Loaded from `.mosaic/config.toml` in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MosaicConfig {
    #[serde(default)]
    pub patterns: PatternConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub atoms: AtomConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub models: ModelConfig,
}

/// Pattern cache thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Minimum success rate for a pattern to be stored
    #[serde(default = "default_storage_threshold")]
    pub storage_threshold: f64,

    /// Minimum similarity for a pattern to qualify as a match
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Weight of the vector score in hybrid search (rest is domain match)
    #[serde(default = "default_hybrid_vector_weight")]
    pub hybrid_vector_weight: f64,

    /// Directory for persisted patterns
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
}

/// Complexity router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Complexity at or above which Balanced is selected
    #[serde(default = "default_balanced_threshold")]
    pub balanced_threshold: f64,

    /// Complexity at or above which Heavy is selected
    #[serde(default = "default_heavy_threshold")]
    pub heavy_threshold: f64,

    /// Complexity added per prior failed attempt
    #[serde(default = "default_failure_escalation")]
    pub failure_escalation: f64,

    #[serde(default = "default_light_cost")]
    pub light_cost: f64,

    #[serde(default = "default_balanced_cost")]
    pub balanced_cost: f64,

    #[serde(default = "default_heavy_cost")]
    pub heavy_cost: f64,
}

/// Orchestrator execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Worker pool size (bounded by provider rate limits)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,

    /// Validation score (0 - 100) required before code is learned
    #[serde(default = "default_learning_threshold")]
    pub learning_threshold: f64,
}

/// Atom sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    #[serde(default = "default_max_statements")]
    pub max_statements: usize,

    #[serde(default = "default_target_min")]
    pub target_min: usize,

    #[serde(default = "default_target_max")]
    pub target_max: usize,

    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: usize,
}

/// Ensemble validation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum combined score (0 - 100)
    #[serde(default = "default_pass_score")]
    pub pass_score: f64,

    /// Fraction of checks that must pass
    #[serde(default = "default_agreement")]
    pub agreement: f64,
}

/// Model selection per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_light_model")]
    pub light: String,

    #[serde(default = "default_balanced_model")]
    pub balanced: String,

    #[serde(default = "default_heavy_model")]
    pub heavy: String,

    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl ModelConfig {
    /// Model name for a tier
    pub fn for_tier(&self, tier: Tier) -> &str {
        match tier {
            Tier::Light => &self.light,
            Tier::Balanced => &self.balanced,
            Tier::Heavy => &self.heavy,
        }
    }
}

// Default value providers
fn default_storage_threshold() -> f64 {
    0.95
}

fn default_min_similarity() -> f64 {
    0.85
}

fn default_top_k() -> usize {
    3
}

fn default_hybrid_vector_weight() -> f64 {
    0.7
}

fn default_balanced_threshold() -> f64 {
    0.6
}

fn default_heavy_threshold() -> f64 {
    0.85
}

fn default_failure_escalation() -> f64 {
    0.1
}

fn default_light_cost() -> f64 {
    1.0
}

fn default_balanced_cost() -> f64 {
    4.0
}

fn default_heavy_cost() -> f64 {
    15.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_workers() -> usize {
    4
}

fn default_attempt_timeout_secs() -> u64 {
    120
}

fn default_cancel_grace_secs() -> u64 {
    10
}

fn default_learning_threshold() -> f64 {
    95.0
}

fn default_max_lines() -> usize {
    crate::DEFAULT_MAX_LINES
}

fn default_max_statements() -> usize {
    8
}

fn default_target_min() -> usize {
    50
}

fn default_target_max() -> usize {
    120
}

fn default_max_split_depth() -> usize {
    3
}

fn default_pass_score() -> f64 {
    70.0
}

fn default_agreement() -> f64 {
    0.75
}

fn default_light_model() -> String {
    "claude-haiku-3-5-20250929".to_string()
}

fn default_balanced_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_heavy_model() -> String {
    "claude-opus-4-20250514".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

impl MosaicConfig {
    /// Load configuration from `.mosaic/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".mosaic/config.toml");

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content).map_err(|e| {
                MosaicError::Config(format!("Failed to parse config file: {}", e))
            })?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.mosaic/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_dir = root.join(".mosaic");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            MosaicError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject thresholds outside their meaningful ranges
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(MosaicError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, v
                )))
            }
        };

        unit("patterns.storage_threshold", self.patterns.storage_threshold)?;
        unit("patterns.min_similarity", self.patterns.min_similarity)?;
        unit("patterns.hybrid_vector_weight", self.patterns.hybrid_vector_weight)?;
        unit("routing.balanced_threshold", self.routing.balanced_threshold)?;
        unit("routing.heavy_threshold", self.routing.heavy_threshold)?;
        unit("validation.agreement", self.validation.agreement)?;

        if self.routing.balanced_threshold > self.routing.heavy_threshold {
            return Err(MosaicError::Config(
                "routing.balanced_threshold must not exceed routing.heavy_threshold".to_string(),
            ));
        }
        if self.execution.max_attempts == 0 {
            return Err(MosaicError::Config(
                "execution.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution.max_workers == 0 {
            return Err(MosaicError::Config(
                "execution.max_workers must be at least 1".to_string(),
            ));
        }
        if self.atoms.target_min > self.atoms.target_max {
            return Err(MosaicError::Config(
                "atoms.target_min must not exceed atoms.target_max".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.validation.pass_score)
            || !(0.0..=100.0).contains(&self.execution.learning_threshold)
        {
            return Err(MosaicError::Config(
                "scores must be within [0, 100]".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            storage_threshold: default_storage_threshold(),
            min_similarity: default_min_similarity(),
            top_k: default_top_k(),
            hybrid_vector_weight: default_hybrid_vector_weight(),
            persist_dir: None,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            balanced_threshold: default_balanced_threshold(),
            heavy_threshold: default_heavy_threshold(),
            failure_escalation: default_failure_escalation(),
            light_cost: default_light_cost(),
            balanced_cost: default_balanced_cost(),
            heavy_cost: default_heavy_cost(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_workers: default_max_workers(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
            learning_threshold: default_learning_threshold(),
        }
    }
}

impl Default for AtomConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_statements: default_max_statements(),
            target_min: default_target_min(),
            target_max: default_target_max(),
            max_split_depth: default_max_split_depth(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            pass_score: default_pass_score(),
            agreement: default_agreement(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            light: default_light_model(),
            balanced: default_balanced_model(),
            heavy: default_heavy_model(),
            api_key_env: default_api_key_env(),
        }
    }
}
