//! The pattern cache interface

use async_trait::async_trait;
use mosaic_core::{Result, SemanticSignature};

use crate::pattern::{Pattern, PatternMatch};

/// Similarity-indexed store of validated patterns
///
/// Shared across plan runs as `Arc<dyn PatternCache>`; implementations must
/// tolerate concurrent `store` and `search` calls.
#[async_trait]
pub trait PatternCache: Send + Sync {
    /// Store a validated solution
    ///
    /// Returns `None` without storing when `success_rate` is below the
    /// storage threshold. A pattern with the same fingerprint is updated in
    /// place and keeps its id.
    async fn store(
        &self,
        signature: &SemanticSignature,
        code: &str,
        success_rate: f64,
    ) -> Result<Option<String>>;

    /// Nearest patterns scoring at least `min_similarity`, best first
    async fn search(
        &self,
        signature: &SemanticSignature,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<PatternMatch>>;

    /// Vector score blended with a domain match when a hint is given
    async fn hybrid_search(
        &self,
        signature: &SemanticSignature,
        domain_hint: Option<&str>,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<PatternMatch>>;

    /// Mark a pattern as the source of finally accepted code
    async fn record_adoption(&self, id: &str) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Pattern>>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every stored pattern, newest first
    async fn all(&self) -> Vec<Pattern>;
}
