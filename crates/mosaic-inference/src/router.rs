//! Complexity estimation and tier routing
//!
//! Both functions are pure: the same signature, match flag, failure count and
//! configuration always produce the same decision.

use mosaic_core::config::RoutingConfig;
use mosaic_core::{RoutingDecision, SemanticSignature, Tier};

const IO_WEIGHT: f64 = 0.30;
const SECURITY_WEIGHT: f64 = 0.40;
const NOVELTY_WEIGHT: f64 = 0.20;
const CONSTRAINT_WEIGHT: f64 = 0.10;

const NOVELTY_WITH_PATTERN: f64 = 0.1;
const NOVELTY_WITHOUT_PATTERN: f64 = 0.8;

#[derive(Debug, Clone, Default)]
pub struct ComplexityRouter {
    config: RoutingConfig,
}

impl ComplexityRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Estimated complexity in [0, 1]
    ///
    /// Each prior failed attempt adds `failure_escalation` so retries climb
    /// towards stronger tiers.
    pub fn estimate_complexity(
        &self,
        signature: &SemanticSignature,
        pattern_found: bool,
        prior_failures: u32,
    ) -> f64 {
        let io = (signature.io_count() as f64 / 10.0).min(1.0);
        let security = signature.security_level.weight();
        let novelty = if pattern_found {
            NOVELTY_WITH_PATTERN
        } else {
            NOVELTY_WITHOUT_PATTERN
        };
        let constraints = (signature.constraints.len() as f64 / 10.0).min(1.0);

        let base = io * IO_WEIGHT
            + security * SECURITY_WEIGHT
            + novelty * NOVELTY_WEIGHT
            + constraints * CONSTRAINT_WEIGHT;

        (base + prior_failures as f64 * self.config.failure_escalation).clamp(0.0, 1.0)
    }

    /// Select a tier for a complexity score
    pub fn route(&self, complexity: f64) -> RoutingDecision {
        let tier = if complexity >= self.config.heavy_threshold {
            Tier::Heavy
        } else if complexity >= self.config.balanced_threshold {
            Tier::Balanced
        } else {
            Tier::Light
        };

        RoutingDecision {
            tier,
            estimated_complexity: complexity,
            estimated_cost: self.unit_cost(tier) * (1.0 + complexity),
        }
    }

    /// Estimate and route in one step
    pub fn decide(
        &self,
        signature: &SemanticSignature,
        pattern_found: bool,
        prior_failures: u32,
    ) -> RoutingDecision {
        self.route(self.estimate_complexity(signature, pattern_found, prior_failures))
    }

    fn unit_cost(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Light => self.config.light_cost,
            Tier::Balanced => self.config.balanced_cost,
            Tier::Heavy => self.config.heavy_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{SecurityLevel, SignatureExtractor, SignatureHints};

    fn simple() -> SemanticSignature {
        SignatureExtractor::new()
            .extract_with(
                "Sort numbers",
                SignatureHints::new()
                    .input("values", "Vec<i64>")
                    .output("sorted", "Vec<i64>")
                    .security(SecurityLevel::Low),
            )
            .unwrap()
    }

    fn demanding() -> SemanticSignature {
        let mut hints = SignatureHints::new().security(SecurityLevel::Critical);
        for i in 0..5 {
            hints = hints
                .input(format!("in{}", i), "String")
                .output(format!("out{}", i), "String");
        }
        for i in 0..10 {
            hints = hints.constraint(format!("must satisfy rule {}", i));
        }
        SignatureExtractor::new()
            .extract_with("Rotate signing keys", hints)
            .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_simple_task_routes_light() {
        let router = ComplexityRouter::default();
        let c = router.estimate_complexity(&simple(), false, 0);
        // 0.2 * 0.3 + 0.1 * 0.4 + 0.8 * 0.2
        assert!(close(c, 0.26), "complexity was {}", c);

        let decision = router.route(c);
        assert_eq!(decision.tier, Tier::Light);
        assert!(close(decision.estimated_cost, 1.26));
    }

    #[test]
    fn test_pattern_lowers_novelty() {
        let router = ComplexityRouter::default();
        let with = router.estimate_complexity(&simple(), true, 0);
        let without = router.estimate_complexity(&simple(), false, 0);
        assert!(close(without - with, 0.14));
    }

    #[test]
    fn test_demanding_task_routes_heavy() {
        let router = ComplexityRouter::default();
        let decision = router.decide(&demanding(), false, 0);
        assert!(close(decision.estimated_complexity, 0.96));
        assert_eq!(decision.tier, Tier::Heavy);
    }

    #[test]
    fn test_failures_escalate_and_clamp() {
        let router = ComplexityRouter::default();
        assert!(close(router.estimate_complexity(&simple(), false, 2), 0.46));
        assert!(close(router.estimate_complexity(&simple(), false, 4), 0.66));
        assert_eq!(router.decide(&simple(), false, 4).tier, Tier::Balanced);
        assert_eq!(router.estimate_complexity(&demanding(), false, 3), 1.0);
    }

    #[test]
    fn test_tier_boundaries() {
        let router = ComplexityRouter::default();
        assert_eq!(router.route(0.0).tier, Tier::Light);
        assert_eq!(router.route(0.5999).tier, Tier::Light);
        assert_eq!(router.route(0.6).tier, Tier::Balanced);
        assert_eq!(router.route(0.8499).tier, Tier::Balanced);
        assert_eq!(router.route(0.85).tier, Tier::Heavy);
        assert_eq!(router.route(1.0).tier, Tier::Heavy);
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let router = ComplexityRouter::new(RoutingConfig {
            balanced_threshold: 0.2,
            ..RoutingConfig::default()
        });
        assert_eq!(router.decide(&simple(), false, 0).tier, Tier::Balanced);
    }
}
