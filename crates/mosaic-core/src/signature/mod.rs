//! Semantic signature extraction, fingerprinting and similarity
//!
//! A signature is the cache key for learned patterns. Equivalent phrasing
//! ("Validate the user's email" / "validate email of user") normalizes to the
//! same purpose and therefore the same fingerprint.

pub mod normalize;

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::{MosaicError, PerformanceTier, Result, SecurityLevel, SemanticSignature};

// Component weights in percent; summing integers keeps an exact match at 1.0
const PURPOSE_WEIGHT: f64 = 40.0;
const IO_WEIGHT: f64 = 30.0;
const DOMAIN_WEIGHT: f64 = 20.0;
const CONSTRAINT_WEIGHT: f64 = 10.0;

pub const DEFAULT_DOMAIN: &str = "general";

/// Explicit signature fields supplied by the planner
///
/// Anything set here wins over what the extractor infers from text.
#[derive(Debug, Clone, Default)]
pub struct SignatureHints {
    pub inputs: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub domain: Option<String>,
    pub constraints: Vec<String>,
    pub security_level: Option<SecurityLevel>,
    pub performance_tier: Option<PerformanceTier>,
    /// Code whose first `fn` signature supplies I/O when none is given
    pub code: Option<String>,
}

impl SignatureHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), ty.into());
        self
    }

    pub fn output(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), ty.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn security(mut self, level: SecurityLevel) -> Self {
        self.security_level = Some(level);
        self
    }

    pub fn performance(mut self, tier: PerformanceTier) -> Self {
        self.performance_tier = Some(tier);
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Builds [`SemanticSignature`]s from free-text task descriptions
#[derive(Debug, Clone, Default)]
pub struct SignatureExtractor;

impl SignatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract a signature from a description and optional code hint
    pub fn extract(&self, description: &str, code_hint: Option<&str>) -> Result<SemanticSignature> {
        let hints = SignatureHints {
            code: code_hint.map(str::to_string),
            ..SignatureHints::default()
        };
        self.extract_with(description, hints)
    }

    /// Extract a signature, letting explicit hints override inference
    pub fn extract_with(&self, description: &str, hints: SignatureHints) -> Result<SemanticSignature> {
        if description.trim().is_empty() {
            return Err(MosaicError::Extraction("empty description".to_string()));
        }

        let (purpose_text, mut constraints) = normalize::split_constraints(description);
        let ordered = normalize::tokens(&purpose_text);
        if ordered.is_empty() {
            return Err(MosaicError::Extraction(format!(
                "description has no meaningful terms: {:?}",
                description
            )));
        }

        let all_tokens = normalize::tokens(description);
        let purpose = normalize::canonical(&ordered);
        let intent = normalize::intent(&ordered).unwrap_or_default();

        let (mut inputs, mut outputs) = (hints.inputs, hints.outputs);
        if inputs.is_empty() && outputs.is_empty() {
            if let Some((code_in, code_out)) =
                hints.code.as_deref().and_then(normalize::io_from_code)
            {
                inputs = code_in;
                outputs = code_out;
            }
        }
        let inputs = inputs
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), normalize::compact_type(&v)))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        let outputs = outputs
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), normalize::compact_type(&v)))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        let domain = hints
            .domain
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .or_else(|| normalize::infer_domain(&all_tokens).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());

        constraints.extend(
            hints
                .constraints
                .iter()
                .map(|c| normalize::normalize_constraint(c))
                .filter(|c| !c.is_empty()),
        );
        let constraints: BTreeSet<String> = constraints.into_iter().collect();

        let mut signature = SemanticSignature {
            purpose,
            idempotent: normalize::is_idempotent(&intent),
            intent,
            inputs,
            outputs,
            domain,
            constraints,
            security_level: hints
                .security_level
                .unwrap_or_else(|| normalize::infer_security(&all_tokens)),
            performance_tier: hints
                .performance_tier
                .unwrap_or_else(|| normalize::infer_performance(&all_tokens)),
            fingerprint: String::new(),
        };
        signature.refresh_fingerprint();

        debug!(
            purpose = %signature.purpose,
            domain = %signature.domain,
            fingerprint = %&signature.fingerprint[..12],
            "Extracted signature"
        );
        Ok(signature)
    }
}

fn push_field(hasher: &mut Sha256, tag: &str, value: &str) {
    hasher.update(tag.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn push_map(hasher: &mut Sha256, tag: &str, map: &BTreeMap<String, String>) {
    hasher.update(tag.as_bytes());
    hasher.update((map.len() as u64).to_le_bytes());
    for (name, ty) in map {
        push_field(hasher, "k", name);
        push_field(hasher, "v", ty);
    }
}

/// SHA-256 over the canonical serialization of a signature
///
/// Covers purpose, inputs, outputs, domain, security level and performance
/// tier. Maps are `BTreeMap`s so iteration order is already sorted.
pub fn fingerprint(sig: &SemanticSignature) -> String {
    let mut hasher = Sha256::new();
    push_field(&mut hasher, "purpose", &sig.purpose);
    push_map(&mut hasher, "inputs", &sig.inputs);
    push_map(&mut hasher, "outputs", &sig.outputs);
    push_field(&mut hasher, "domain", &sig.domain);
    push_field(&mut hasher, "security", &sig.security_level.to_string());
    push_field(&mut hasher, "performance", &sig.performance_tier.to_string());
    hex::encode(hasher.finalize())
}

/// Jaccard overlap where two empty sets overlap fully
fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    shared / union
}

/// Weighted similarity between two signatures (0.0 - 1.0)
///
/// purpose Jaccard × 0.40 + I/O key overlap × 0.30 + domain (1.0 exact,
/// 0.5 otherwise) × 0.20 + shared constraints × 0.10.
pub fn similarity(a: &SemanticSignature, b: &SemanticSignature) -> f64 {
    let purpose = jaccard(&a.purpose_tokens(), &b.purpose_tokens());
    let io = jaccard(&a.io_keys(), &b.io_keys());
    let domain = if a.domain == b.domain { 1.0 } else { 0.5 };
    let constraints = jaccard(&a.constraints, &b.constraints);

    let score = purpose * PURPOSE_WEIGHT
        + io * IO_WEIGHT
        + domain * DOMAIN_WEIGHT
        + constraints * CONSTRAINT_WEIGHT;
    (score / 100.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(description: &str, hints: SignatureHints) -> SemanticSignature {
        SignatureExtractor::new()
            .extract_with(description, hints)
            .unwrap()
    }

    fn crud_hints() -> SignatureHints {
        SignatureHints::new()
            .input("user_id", "u64")
            .output("user", "User")
            .domain("crud")
    }

    #[test]
    fn test_equivalent_phrasing_same_fingerprint() {
        let a = extract("Validate the user's email", SignatureHints::new());
        let b = extract("validate email of user", SignatureHints::new());
        assert_eq!(a.purpose, "email user validate");
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = extract("Load user record", crud_hints());
        let b = extract("Load user record", crud_hints());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
        assert_eq!(fingerprint(&a), a.fingerprint);
    }

    #[test]
    fn test_fingerprint_changes_with_each_field() {
        let base = extract("Load user record", crud_hints());

        let mut purpose = base.clone();
        purpose.purpose = "load record".to_string();
        let mut inputs = base.clone();
        inputs.inputs.insert("tenant".to_string(), "String".to_string());
        let mut outputs = base.clone();
        outputs.outputs.insert("user".to_string(), "Option<User>".to_string());
        let mut domain = base.clone();
        domain.domain = "auth".to_string();
        let mut security = base.clone();
        security.security_level = SecurityLevel::Critical;
        let mut performance = base.clone();
        performance.performance_tier = PerformanceTier::Critical;

        for changed in [purpose, inputs, outputs, domain, security, performance] {
            assert_ne!(fingerprint(&changed), base.fingerprint);
        }
    }

    #[test]
    fn test_empty_description_rejected() {
        let extractor = SignatureExtractor::new();
        assert!(matches!(
            extractor.extract("   ", None),
            Err(MosaicError::Extraction(_))
        ));
        assert!(matches!(
            extractor.extract("the and of", None),
            Err(MosaicError::Extraction(_))
        ));
    }

    #[test]
    fn test_code_hint_supplies_io() {
        let sig = SignatureExtractor::new()
            .extract(
                "Parse a port number",
                Some("fn parse_port(raw: &str) -> Result<u16, ParseError> { todo!() }"),
            )
            .unwrap();
        assert_eq!(sig.inputs.get("raw").unwrap(), "&str");
        assert_eq!(sig.outputs.get("result").unwrap(), "Result<u16,ParseError>");
        assert_eq!(sig.intent, "parse");
        assert!(sig.idempotent);
    }

    #[test]
    fn test_constraints_extracted() {
        let sig = extract(
            "Hash the password, must use argon2",
            SignatureHints::new(),
        );
        assert!(sig.constraints.contains("must use argon2"));
        assert!(!sig.purpose.contains("argon2"));
        assert_eq!(sig.security_level, SecurityLevel::Critical);
        assert_eq!(sig.domain, "auth");
    }

    #[test]
    fn test_similarity_reflexive_and_symmetric() {
        let a = extract("Create user record", crud_hints());
        let b = extract("Delete order row", SignatureHints::new().input("order_id", "u64"));
        assert_eq!(similarity(&a, &a), 1.0);
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
        let s = similarity(&a, &b);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn test_near_miss_same_domain_different_io() {
        let a = extract(
            "Create user record",
            SignatureHints::new()
                .input("name", "String")
                .output("user", "User")
                .domain("crud"),
        );
        let b = extract(
            "Create user record",
            SignatureHints::new()
                .input("payload", "UserDraft")
                .output("id", "u64")
                .domain("crud"),
        );
        let s = similarity(&a, &b);
        assert!((0.6..=0.8).contains(&s), "similarity was {}", s);
    }

    #[test]
    fn test_domain_mismatch_scores_half() {
        let a = extract("Format invoice total", SignatureHints::new().domain("payment"));
        let b = extract("Format invoice total", SignatureHints::new().domain("text"));
        let s = similarity(&a, &b);
        assert!((s - 0.9).abs() < 1e-9, "similarity was {}", s);
    }
}
