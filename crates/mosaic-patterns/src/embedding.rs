//! Deterministic signature embeddings
//!
//! Feature hashing over four weighted blocks. Each block is L2-normalized and
//! scaled by the square root of its weight, so the cosine of two embeddings
//! is the weighted sum of per-block cosines.

use mosaic_core::SemanticSignature;
use sha2::{Digest, Sha256};

/// (block name, width, weight)
const BLOCKS: [(&str, usize, f64); 4] = [
    ("purpose", 128, 0.40),
    ("io", 64, 0.30),
    ("domain", 32, 0.20),
    ("constraints", 32, 0.10),
];

pub const DIMENSIONS: usize = 256;

// Hashed in place of an empty block so two empty blocks still match
const EMPTY_SENTINEL: &str = "\u{2205}";

fn bucket(block: &str, token: &str, width: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(block.as_bytes());
    hasher.update([0u8]);
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let raw = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    raw as usize % width
}

fn fill_block(out: &mut [f64], block: &str, weight: f64, tokens: &[String]) {
    let width = out.len();
    if tokens.is_empty() {
        out[bucket(block, EMPTY_SENTINEL, width)] += 1.0;
    } else {
        for token in tokens {
            out[bucket(block, token, width)] += 1.0;
        }
    }

    let norm = out.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        let scale = weight.sqrt() / norm;
        out.iter_mut().for_each(|v| *v *= scale);
    }
}

/// Embed a signature into a [`DIMENSIONS`]-long vector
pub fn embed(sig: &SemanticSignature) -> Vec<f64> {
    let purpose: Vec<String> = sig.purpose_tokens().into_iter().map(str::to_string).collect();
    let io: Vec<String> = sig.io_keys().into_iter().collect();
    let domain = vec![sig.domain.clone()];
    let constraints: Vec<String> = sig.constraints.iter().cloned().collect();
    let inputs = [purpose, io, domain, constraints];

    let mut vector = vec![0.0; DIMENSIONS];
    let mut offset = 0;
    for ((name, width, weight), tokens) in BLOCKS.iter().zip(inputs.iter()) {
        fill_block(&mut vector[offset..offset + width], name, *weight, tokens);
        offset += width;
    }
    vector
}

/// Cosine similarity, clamped to [0, 1]
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f64>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{SignatureExtractor, SignatureHints};

    fn sig(description: &str, hints: SignatureHints) -> SemanticSignature {
        SignatureExtractor::new()
            .extract_with(description, hints)
            .unwrap()
    }

    #[test]
    fn test_embedding_is_deterministic_and_unit_length() {
        let s = sig("Create user record", SignatureHints::new().input("name", "String"));
        let a = embed(&s);
        let b = embed(&s);
        assert_eq!(a, b);
        assert_eq!(a.len(), DIMENSIONS);

        let norm = a.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_identical_signatures_have_cosine_one() {
        let s = sig("Parse config file", SignatureHints::new().output("config", "Config"));
        let e = embed(&s);
        assert!((cosine(&e, &e) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_related_closer_than_unrelated() {
        let base = sig(
            "Create user record",
            SignatureHints::new().input("name", "String").domain("crud"),
        );
        let related = sig(
            "Create user record",
            SignatureHints::new().input("email", "String").domain("crud"),
        );
        let unrelated = sig(
            "Send payment refund notification",
            SignatureHints::new().input("refund_id", "u64").domain("payment"),
        );

        let e = embed(&base);
        assert!(cosine(&e, &embed(&related)) > cosine(&e, &embed(&unrelated)));
    }

    #[test]
    fn test_cosine_of_zero_vector() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
