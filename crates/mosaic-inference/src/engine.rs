//! Constraint-preserving inference engine
//!
//! Two paths produce a candidate for an atom:
//!
//! - **Adaptation**: a qualifying pattern exists; the model adapts it. The
//!   implementation stage runs on the Light tier unless routing chose Heavy.
//! - **First principles**: no pattern; both stages run on the routed tier.
//!
//! Either way the candidate passes through [`ConstraintChecker`] before it
//! is handed to validation.

use mosaic_agent::InferenceRole;
use mosaic_core::config::{MosaicConfig, PatternConfig};
use mosaic_core::fail_open::fail_open;
use mosaic_core::{AtomicTask, AttemptOutcome, Result, RoutingDecision, Tier};
use mosaic_patterns::{PatternCache, PatternMatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::constraints::{ConstraintChecker, ConstraintReport};
use crate::prompt::{build_implementation_prompt, build_strategy_prompt, extract_code};
use crate::router::ComplexityRouter;
use crate::tiers::TierTable;

/// Which synthesis path produced a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum InferencePath {
    Adapted { pattern_id: String, score: f64 },
    FirstPrinciples,
}

impl InferencePath {
    pub fn pattern_id(&self) -> Option<&str> {
        match self {
            Self::Adapted { pattern_id, .. } => Some(pattern_id),
            Self::FirstPrinciples => None,
        }
    }
}

/// Routing result and best pattern for one attempt
#[derive(Debug, Clone)]
pub struct Preparation {
    pub routing: RoutingDecision,
    pub pattern: Option<PatternMatch>,
}

/// Output of one synthesis attempt
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub code: String,
    pub strategy: String,
    pub path: InferencePath,
    pub routing: RoutingDecision,
    pub implementation_tier: Tier,
    pub report: ConstraintReport,
}

impl Synthesis {
    /// Whether the candidate may proceed to validation
    pub fn accepted(&self) -> bool {
        self.report.is_clean()
    }
}

pub struct InferenceEngine {
    patterns: Arc<dyn PatternCache>,
    tiers: TierTable,
    router: ComplexityRouter,
    checker: ConstraintChecker,
    pattern_config: PatternConfig,
    /// Domain supplied by the host; blends metadata into the pattern search
    domain_hint: Option<String>,
}

impl InferenceEngine {
    pub fn new(patterns: Arc<dyn PatternCache>, tiers: TierTable, config: &MosaicConfig) -> Self {
        Self {
            patterns,
            tiers,
            router: ComplexityRouter::new(config.routing.clone()),
            checker: ConstraintChecker::new(config.atoms.max_statements),
            pattern_config: config.patterns.clone(),
            domain_hint: None,
        }
    }

    pub fn with_domain_hint(mut self, domain: impl Into<String>) -> Self {
        self.domain_hint = Some(domain.into());
        self
    }

    pub fn router(&self) -> &ComplexityRouter {
        &self.router
    }

    /// Look up a qualifying pattern and route the attempt
    ///
    /// A failing pattern lookup degrades to "no pattern" instead of failing
    /// the attempt. The atom's own domain is already part of the embedding,
    /// so only a host-supplied hint switches to hybrid search.
    #[instrument(skip(self, task), fields(atom = %task.id))]
    pub async fn prepare(&self, task: &AtomicTask) -> Preparation {
        let sig = &task.signature;
        let top_k = self.pattern_config.top_k;
        let min_similarity = self.pattern_config.min_similarity;
        let matches = fail_open("pattern_search", || async {
            match &self.domain_hint {
                Some(hint) => {
                    self.patterns
                        .hybrid_search(sig, Some(hint.as_str()), top_k, min_similarity)
                        .await
                }
                None => self.patterns.search(sig, top_k, min_similarity).await,
            }
        })
        .await
        .unwrap_or_default();

        let pattern = matches.into_iter().next();
        let prior_failures = task
            .attempts
            .iter()
            .filter(|a| a.outcome != AttemptOutcome::Accepted)
            .count() as u32;
        let routing = self.router.decide(sig, pattern.is_some(), prior_failures);

        debug!(
            tier = %routing.tier,
            complexity = routing.estimated_complexity,
            pattern = pattern.as_ref().map(|p| p.pattern.id.as_str()),
            prior_failures,
            "Routed atom"
        );
        Preparation { routing, pattern }
    }

    /// Run the strategy and implementation stages, then check constraints
    #[instrument(skip(self, task, preparation), fields(atom = %task.id, tier = %preparation.routing.tier))]
    pub async fn synthesize(&self, task: &AtomicTask, preparation: &Preparation) -> Result<Synthesis> {
        let routed = preparation.routing.tier;
        let pattern = preparation.pattern.as_ref();

        let (path, implementation_tier) = match pattern {
            Some(m) => (
                InferencePath::Adapted {
                    pattern_id: m.pattern.id.clone(),
                    score: m.score,
                },
                if routed == Tier::Heavy { Tier::Heavy } else { Tier::Light },
            ),
            None => (InferencePath::FirstPrinciples, routed),
        };

        let strategy_prompt = build_strategy_prompt(task, pattern, &task.attempts);
        let strategy = self
            .tiers
            .get(routed)?
            .provider
            .infer(&strategy_prompt, InferenceRole::Strategy)
            .await?;

        let implementation_prompt =
            build_implementation_prompt(task, &strategy, pattern, &task.attempts);
        let response = self
            .tiers
            .get(implementation_tier)?
            .provider
            .infer(&implementation_prompt, InferenceRole::Implementation)
            .await?;

        let code = extract_code(&response);
        let report = self.checker.check(&code, task);

        info!(
            path = ?path,
            implementation_tier = %implementation_tier,
            lines = report.code_lines,
            violations = report.violations.len(),
            "Synthesized candidate"
        );

        Ok(Synthesis {
            code,
            strategy,
            path,
            routing: preparation.routing,
            implementation_tier,
            report,
        })
    }

    /// Prepare and synthesize in one call
    pub async fn infer(&self, task: &AtomicTask) -> Result<Synthesis> {
        let preparation = self.prepare(task).await;
        self.synthesize(task, &preparation).await
    }
}
