//! In-process pattern cache with optional JSON persistence

use async_trait::async_trait;
use mosaic_core::config::PatternConfig;
use mosaic_core::fail_open::fail_open;
use mosaic_core::{MosaicError, Result, SemanticSignature};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::PatternCache;
use crate::embedding::{cosine, embed};
use crate::pattern::{Pattern, PatternMatch};

struct Entry {
    pattern: Pattern,
    embedding: Vec<f64>,
}

#[derive(Default)]
struct Index {
    entries: HashMap<String, Entry>,
    /// fingerprint -> pattern id
    by_fingerprint: HashMap<String, String>,
}

impl Index {
    fn insert(&mut self, pattern: Pattern) {
        let embedding = embed(&pattern.signature);
        self.by_fingerprint
            .insert(pattern.fingerprint().to_string(), pattern.id.clone());
        self.entries
            .insert(pattern.id.clone(), Entry { pattern, embedding });
    }

    /// Linear nearest-neighbour scan; returns (id, vector score, domain)
    fn scan(&self, signature: &SemanticSignature) -> Vec<(String, f64, String)> {
        let query = embed(signature);
        self.entries
            .values()
            .map(|entry| {
                let score = if entry.pattern.fingerprint() == signature.fingerprint {
                    1.0
                } else {
                    cosine(&query, &entry.embedding)
                };
                (entry.pattern.id.clone(), score, entry.pattern.domain.clone())
            })
            .collect()
    }
}

/// Pattern cache held in memory behind an async `RwLock`
///
/// Searches share the read lock; stores and adoptions take the write lock.
/// When a persist directory is set every stored pattern is also written as
/// `<dir>/<id>.json` and reloaded by [`InMemoryPatternCache::open`].
pub struct InMemoryPatternCache {
    index: RwLock<Index>,
    storage_threshold: f64,
    hybrid_vector_weight: f64,
    persist_dir: Option<PathBuf>,
}

impl InMemoryPatternCache {
    pub fn new(config: &PatternConfig) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            storage_threshold: config.storage_threshold,
            hybrid_vector_weight: config.hybrid_vector_weight,
            persist_dir: config.persist_dir.clone(),
        }
    }

    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    /// Build a cache and load any patterns persisted in its directory
    pub async fn open(config: &PatternConfig) -> Result<Self> {
        let cache = Self::new(config);
        cache.load().await?;
        Ok(cache)
    }

    /// Load `*.json` patterns from the persist directory
    ///
    /// Unreadable files are skipped with a warning.
    pub async fn load(&self) -> Result<usize> {
        let Some(dir) = &self.persist_dir else {
            return Ok(0);
        };
        if !dir.exists() {
            debug!(?dir, "Pattern directory does not exist yet");
            return Ok(0);
        }

        let mut loaded = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                match Self::read_pattern(&path).await {
                    Ok(pattern) => loaded.push(pattern),
                    Err(e) => warn!(?path, error = %e, "Skipping unreadable pattern file"),
                }
            }
        }

        let count = loaded.len();
        let mut index = self.index.write().await;
        for pattern in loaded {
            index.insert(pattern);
        }
        info!(count, ?dir, "Loaded patterns");
        Ok(count)
    }

    async fn read_pattern(path: &Path) -> Result<Pattern> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn persist(&self, pattern: &Pattern) -> Result<()> {
        let Some(dir) = &self.persist_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", pattern.id));
        let content = serde_json::to_string_pretty(pattern)?;
        tokio::fs::write(&path, content).await?;
        debug!(id = %pattern.id, ?path, "Persisted pattern");
        Ok(())
    }

    /// Write a pattern file; the in-memory index stays authoritative on failure
    async fn persist_or_warn(&self, pattern: &Pattern) {
        fail_open("pattern_persist", || self.persist(pattern)).await;
    }

    /// Rank scored ids, then bump consulted counts for the returned hits
    async fn finish_search(
        &self,
        mut scored: Vec<(String, f64)>,
        top_k: usize,
        min_similarity: f64,
    ) -> Vec<PatternMatch> {
        scored.retain(|(_, score)| *score >= min_similarity);
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_k);
        if scored.is_empty() {
            return Vec::new();
        }

        let mut index = self.index.write().await;
        let mut hits = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            let Some(entry) = index.entries.get_mut(&id) else {
                continue;
            };
            entry.pattern.record_consult();
            hits.push(PatternMatch {
                pattern: entry.pattern.clone(),
                score,
            });
        }
        // Still under the lock so a consult never overwrites a newer store
        for hit in &hits {
            self.persist_or_warn(&hit.pattern).await;
        }
        hits
    }
}

#[async_trait]
impl PatternCache for InMemoryPatternCache {
    async fn store(
        &self,
        signature: &SemanticSignature,
        code: &str,
        success_rate: f64,
    ) -> Result<Option<String>> {
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(MosaicError::Pattern(format!(
                "success rate must be within [0, 1], got {}",
                success_rate
            )));
        }
        if success_rate < self.storage_threshold {
            debug!(
                success_rate,
                threshold = self.storage_threshold,
                "Pattern below storage threshold, not stored"
            );
            return Ok(None);
        }

        let mut index = self.index.write().await;
        let pattern = match index.by_fingerprint.get(&signature.fingerprint).cloned() {
            Some(id) => {
                let entry = index.entries.get_mut(&id).ok_or_else(|| {
                    MosaicError::Pattern(format!("fingerprint index points at missing {}", id))
                })?;
                entry.pattern.refresh(code, success_rate);
                debug!(%id, "Updated existing pattern");
                entry.pattern.clone()
            }
            None => {
                let pattern = Pattern::new(signature.clone(), code, success_rate);
                index.insert(pattern.clone());
                info!(id = %pattern.id, domain = %pattern.domain, "Stored new pattern");
                pattern
            }
        };

        // Written under the lock so files never lag behind a later update
        self.persist_or_warn(&pattern).await;
        Ok(Some(pattern.id))
    }

    async fn search(
        &self,
        signature: &SemanticSignature,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<PatternMatch>> {
        let scored: Vec<(String, f64)> = {
            let index = self.index.read().await;
            index
                .scan(signature)
                .into_iter()
                .map(|(id, score, _)| (id, score))
                .collect()
        };
        Ok(self.finish_search(scored, top_k, min_similarity).await)
    }

    async fn hybrid_search(
        &self,
        signature: &SemanticSignature,
        domain_hint: Option<&str>,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<PatternMatch>> {
        let Some(hint) = domain_hint else {
            return self.search(signature, top_k, min_similarity).await;
        };

        let w = self.hybrid_vector_weight;
        let scored: Vec<(String, f64)> = {
            let index = self.index.read().await;
            index
                .scan(signature)
                .into_iter()
                .map(|(id, score, domain)| {
                    let domain_match = if domain == hint { 1.0 } else { 0.0 };
                    (id, (w * score + (1.0 - w) * domain_match).clamp(0.0, 1.0))
                })
                .collect()
        };
        Ok(self.finish_search(scored, top_k, min_similarity).await)
    }

    async fn record_adoption(&self, id: &str) -> Result<()> {
        let mut index = self.index.write().await;
        let entry = index
            .entries
            .get_mut(id)
            .ok_or_else(|| MosaicError::Pattern(format!("unknown pattern {}", id)))?;
        entry.pattern.record_adoption();
        let pattern = entry.pattern.clone();
        self.persist_or_warn(&pattern).await;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Pattern>> {
        let index = self.index.read().await;
        Ok(index.entries.get(id).map(|e| e.pattern.clone()))
    }

    async fn len(&self) -> usize {
        self.index.read().await.entries.len()
    }

    async fn all(&self) -> Vec<Pattern> {
        let index = self.index.read().await;
        let mut patterns: Vec<Pattern> = index.entries.values().map(|e| e.pattern.clone()).collect();
        patterns.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{SignatureExtractor, SignatureHints};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sig(description: &str, hints: SignatureHints) -> SemanticSignature {
        SignatureExtractor::new()
            .extract_with(description, hints)
            .unwrap()
    }

    fn user_sig() -> SemanticSignature {
        sig(
            "Create user record",
            SignatureHints::new()
                .input("name", "String")
                .output("user", "User")
                .domain("crud"),
        )
    }

    fn cache() -> InMemoryPatternCache {
        InMemoryPatternCache::new(&PatternConfig::default())
    }

    #[tokio::test]
    async fn test_storage_threshold() {
        let cache = cache();
        let s = user_sig();

        assert_eq!(cache.store(&s, "fn a() {}", 0.94).await.unwrap(), None);
        assert!(cache.is_empty().await);

        let id = cache.store(&s, "fn a() {}", 0.95).await.unwrap().unwrap();
        let hits = cache.search(&s, 3, 0.85).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pattern.id, id);
        assert_eq!(hits[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_out_of_range_success_rate_rejected() {
        let result = cache().store(&user_sig(), "fn a() {}", 1.5).await;
        assert!(matches!(result, Err(MosaicError::Pattern(_))));
    }

    #[tokio::test]
    async fn test_upsert_keeps_id() {
        let cache = cache();
        let s = user_sig();
        let first = cache.store(&s, "fn a() {}", 0.96).await.unwrap();
        let second = cache.store(&s, "fn b() {}", 0.99).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len().await, 1);
        let stored = cache.get(&first.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.code, "fn b() {}");
        assert_eq!(stored.success_rate, 0.99);
    }

    #[tokio::test]
    async fn test_search_filters_and_orders() {
        let cache = cache();
        cache.store(&user_sig(), "fn a() {}", 1.0).await.unwrap();
        cache
            .store(
                &sig(
                    "Refund card payment",
                    SignatureHints::new().input("charge_id", "u64").domain("payment"),
                ),
                "fn r() {}",
                1.0,
            )
            .await
            .unwrap();

        let hits = cache.search(&user_sig(), 5, 0.0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].pattern.domain, "crud");

        let strict = cache.search(&user_sig(), 5, 0.85).await.unwrap();
        assert_eq!(strict.len(), 1);

        let nothing = cache
            .search(&sig("Render slug text", SignatureHints::new()), 5, 0.85)
            .await
            .unwrap();
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn test_consulted_and_adopted_tracked_separately() {
        let cache = cache();
        let id = cache.store(&user_sig(), "fn a() {}", 1.0).await.unwrap().unwrap();

        cache.search(&user_sig(), 1, 0.5).await.unwrap();
        let hits = cache.search(&user_sig(), 1, 0.5).await.unwrap();
        assert_eq!(hits[0].pattern.consulted_count, 2);

        cache.record_adoption(&id).await.unwrap();
        let pattern = cache.get(&id).await.unwrap().unwrap();
        assert_eq!(pattern.consulted_count, 2);
        assert_eq!(pattern.adopted_count, 1);
        assert_eq!(pattern.usage_count(), 1);

        assert!(cache.record_adoption("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_hybrid_search_weights_domain() {
        let cache = cache();
        let s = user_sig();
        cache.store(&s, "fn a() {}", 1.0).await.unwrap();

        let matching = cache.hybrid_search(&s, Some("crud"), 1, 0.0).await.unwrap();
        assert!((matching[0].score - 1.0).abs() < 1e-9);

        let other = cache.hybrid_search(&s, Some("auth"), 1, 0.0).await.unwrap();
        assert!((other[0].score - 0.7).abs() < 1e-9);

        let plain = cache.hybrid_search(&s, None, 1, 0.0).await.unwrap();
        assert_eq!(plain[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        let config = PatternConfig {
            persist_dir: Some(dir.path().to_path_buf()),
            ..PatternConfig::default()
        };

        let cache = InMemoryPatternCache::new(&config);
        let id = cache.store(&user_sig(), "fn a() {}", 0.98).await.unwrap().unwrap();
        cache.record_adoption(&id).await.unwrap();
        tokio::fs::write(dir.path().join("junk.json"), "not json").await.unwrap();

        let reopened = InMemoryPatternCache::open(&config).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        let pattern = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(pattern.adopted_count, 1);

        let hits = reopened.search(&user_sig(), 1, 0.85).await.unwrap();
        assert_eq!(hits[0].pattern.id, id);
    }

    #[tokio::test]
    async fn test_consulted_count_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = PatternConfig {
            persist_dir: Some(dir.path().to_path_buf()),
            ..PatternConfig::default()
        };

        let cache = InMemoryPatternCache::new(&config);
        let id = cache.store(&user_sig(), "fn a() {}", 1.0).await.unwrap().unwrap();
        cache.search(&user_sig(), 1, 0.85).await.unwrap();
        cache.search(&user_sig(), 1, 0.85).await.unwrap();

        let reopened = InMemoryPatternCache::open(&config).await.unwrap();
        let pattern = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(pattern.consulted_count, 2);
        assert_eq!(pattern.adopted_count, 0);
    }

    #[tokio::test]
    async fn test_store_indexes_pattern_when_write_fails() {
        let dir = tempdir().unwrap();
        // A regular file where the pattern directory should be
        let blocked = dir.path().join("patterns");
        tokio::fs::write(&blocked, "").await.unwrap();

        let cache = cache().with_persist_dir(&blocked);
        let id = cache.store(&user_sig(), "fn a() {}", 1.0).await.unwrap().unwrap();

        assert!(cache.get(&id).await.unwrap().is_some());
        assert_eq!(cache.search(&user_sig(), 1, 0.85).await.unwrap().len(), 1);
        cache.record_adoption(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_store_and_search() {
        let cache = Arc::new(cache());
        let mut handles = Vec::new();

        for i in 0..20 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let s = sig(
                    &format!("Compute metric value{}", i),
                    SignatureHints::new().input(format!("input{}", i), "u64"),
                );
                cache.store(&s, "fn m() {}", 1.0).await.unwrap();
                cache.search(&s, 3, 0.5).await.unwrap()
            }));
        }

        for handle in handles {
            let hits = handle.await.unwrap();
            assert!(!hits.is_empty());
        }
        assert_eq!(cache.len().await, 20);
    }
}
