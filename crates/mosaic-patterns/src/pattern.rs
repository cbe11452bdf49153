//! Pattern records

use chrono::{DateTime, Utc};
use mosaic_core::SemanticSignature;
use serde::{Deserialize, Serialize};

/// A validated solution keyed by its semantic signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub signature: SemanticSignature,
    pub code: String,
    pub domain: String,
    /// Success rate when stored (0.0 - 1.0)
    pub success_rate: f64,
    /// Times this pattern was returned by a search
    #[serde(default)]
    pub consulted_count: u32,
    /// Times code derived from this pattern was finally accepted
    #[serde(default)]
    pub adopted_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    pub fn new(signature: SemanticSignature, code: impl Into<String>, success_rate: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain: signature.domain.clone(),
            signature,
            code: code.into(),
            success_rate,
            consulted_count: 0,
            adopted_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Usage count is the adopted count; consults alone do not count as use
    pub fn usage_count(&self) -> u32 {
        self.adopted_count
    }

    pub fn fingerprint(&self) -> &str {
        &self.signature.fingerprint
    }

    /// Replace the code of an existing pattern (same fingerprint)
    pub fn refresh(&mut self, code: impl Into<String>, success_rate: f64) {
        self.code = code.into();
        self.success_rate = success_rate;
        self.updated_at = Utc::now();
    }

    pub fn record_consult(&mut self) {
        self.consulted_count += 1;
    }

    pub fn record_adoption(&mut self) {
        self.adopted_count += 1;
        self.updated_at = Utc::now();
    }
}

/// A search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: Pattern,
    /// Similarity score (0.0 - 1.0)
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{SignatureExtractor, SignatureHints};

    #[test]
    fn test_counts_are_separate() {
        let sig = SignatureExtractor::new()
            .extract_with("Load user record", SignatureHints::new().domain("crud"))
            .unwrap();
        let mut pattern = Pattern::new(sig, "fn load() {}", 0.97);
        assert_eq!(pattern.domain, "crud");

        pattern.record_consult();
        pattern.record_consult();
        pattern.record_adoption();

        assert_eq!(pattern.consulted_count, 2);
        assert_eq!(pattern.adopted_count, 1);
        assert_eq!(pattern.usage_count(), 1);
    }
}
