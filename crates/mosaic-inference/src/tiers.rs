//! Tier to provider dispatch

use mosaic_agent::{AnthropicProvider, InferenceProvider};
use mosaic_core::config::ModelConfig;
use mosaic_core::{MosaicError, Result, Tier};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a tier's calls are served
#[derive(Clone)]
pub struct TierStrategy {
    pub provider: Arc<dyn InferenceProvider>,
    /// Label shown in logs and reports
    pub model_label: String,
    pub max_tokens: usize,
}

impl TierStrategy {
    pub fn new(provider: Arc<dyn InferenceProvider>) -> Self {
        Self {
            model_label: provider.label().to_string(),
            provider,
            max_tokens: 4096,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl std::fmt::Debug for TierStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierStrategy")
            .field("model_label", &self.model_label)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Lookup table from the closed [`Tier`] enum to strategies
///
/// Adding a tier means adding a variant and a row here; routing code never
/// branches on providers.
#[derive(Debug, Clone, Default)]
pub struct TierTable {
    strategies: BTreeMap<Tier, TierStrategy>,
}

impl TierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, tier: Tier, strategy: TierStrategy) -> Self {
        self.strategies.insert(tier, strategy);
        self
    }

    /// Same provider for every tier (tests, single-model setups)
    pub fn uniform(provider: Arc<dyn InferenceProvider>) -> Self {
        Tier::ALL.iter().fold(Self::new(), |table, tier| {
            table.with_tier(*tier, TierStrategy::new(provider.clone()))
        })
    }

    /// One Anthropic model per tier, as configured
    pub fn anthropic(models: &ModelConfig) -> Self {
        Tier::ALL.iter().fold(Self::new(), |table, tier| {
            let max_tokens = match tier {
                Tier::Light => 2048,
                Tier::Balanced => 4096,
                Tier::Heavy => 8192,
            };
            let provider = AnthropicProvider::for_tier(models, *tier).with_max_tokens(max_tokens);
            table.with_tier(
                *tier,
                TierStrategy::new(Arc::new(provider)).with_max_tokens(max_tokens),
            )
        })
    }

    pub fn get(&self, tier: Tier) -> Result<&TierStrategy> {
        self.strategies
            .get(&tier)
            .ok_or_else(|| MosaicError::Inference(format!("No provider configured for tier {}", tier)))
    }

    pub fn tiers(&self) -> impl Iterator<Item = Tier> + '_ {
        self.strategies.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_agent::FnProvider;

    #[test]
    fn test_uniform_covers_all_tiers() {
        let table = TierTable::uniform(Arc::new(FnProvider::fixed("ok").with_label("stub")));
        assert_eq!(table.tiers().collect::<Vec<_>>(), Tier::ALL.to_vec());
        assert_eq!(table.get(Tier::Heavy).unwrap().model_label, "stub");
    }

    #[test]
    fn test_missing_tier_is_error() {
        let table = TierTable::new().with_tier(
            Tier::Light,
            TierStrategy::new(Arc::new(FnProvider::fixed("ok"))),
        );
        assert!(table.get(Tier::Light).is_ok());
        assert!(matches!(
            table.get(Tier::Balanced),
            Err(MosaicError::Inference(_))
        ));
    }

    #[test]
    fn test_anthropic_table_uses_configured_models() {
        let table = TierTable::anthropic(&ModelConfig::default());
        let heavy = table.get(Tier::Heavy).unwrap();
        assert!(heavy.model_label.contains("opus"));
        assert_eq!(heavy.max_tokens, 8192);
    }
}
