//! Semantic deduplication memory: an append-only store of previously
//! published items, gating the pipeline before expensive work and feeding
//! internal cross-links afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use autopress_common::{KnowledgeEntry, RelatedLink, TextEmbedder};
use gen_client::{Capability, Executor, GenError, RequestSpec};

use crate::store;

/// Phase-1 lexical rejection threshold on normalized titles.
const LEXICAL_SIMILARITY_THRESHOLD: f64 = 0.65;
/// Candidates shorter than this are too generic for the substring test.
const SUBSTRING_MIN_LEN: usize = 8;
/// Phase-2 retrieval window and cap keep the judge prompt bounded as the
/// store grows.
const JUDGE_WINDOW_DAYS: i64 = 120;
const JUDGE_MAX_TITLES: usize = 60;

const JUDGE_SYSTEM: &str = "\
You judge whether a proposed article topic duplicates previously published work. \
Treat as duplicates: a roundup topic immediately following a deep-dive on its lead item; \
the same named product, release, or entity revisited within 7 days; \
question and statement phrasings of the same underlying topic; \
a topic fully contained in an earlier one. \
Different versions or genuinely new developments are NOT duplicates. \
Answer with a JSON object: {\"is_duplicate\": true|false, \"reason\": \"...\"}.";

pub struct KnowledgeStore {
    path: PathBuf,
    entries: Vec<KnowledgeEntry>,
    embedder: Arc<dyn TextEmbedder>,
    executor: Executor,
    fail_open: bool,
}

impl KnowledgeStore {
    /// Load the store from disk, backfilling missing embeddings (self-healing
    /// migration for legacy entries) and persisting if anything changed.
    pub async fn load(
        path: PathBuf,
        embedder: Arc<dyn TextEmbedder>,
        executor: Executor,
        fail_open: bool,
    ) -> Result<Self> {
        let entries: Vec<KnowledgeEntry> = store::load_or_default(&path, "knowledge store");
        let (entries, dirty) = upgrade_entries(entries, embedder.as_ref()).await;

        let loaded = Self {
            path,
            entries,
            embedder,
            executor,
            fail_open,
        };
        if dirty {
            loaded.persist()?;
        }
        info!(entries = loaded.entries.len(), "knowledge store loaded");
        Ok(loaded)
    }

    /// Append a newly published item. Idempotent by `url`: re-recording an
    /// existing URL is a logged no-op, which makes crash-replay safe.
    pub async fn record(
        &mut self,
        title: &str,
        url: &str,
        category: &str,
        post_id: Option<String>,
    ) -> Result<()> {
        if self.entries.iter().any(|e| e.url == url) {
            warn!(url, "entry already recorded, skipping");
            return Ok(());
        }

        // An embedding failure must not lose the entry; the backfill at next
        // load heals it.
        let embedding = match self.embedder.embed(title).await {
            Ok(v) => v,
            Err(e) => {
                warn!(title, error = %e, "embedding failed, recording without one");
                Vec::new()
            }
        };

        let now = Utc::now();
        self.entries.push(KnowledgeEntry {
            title: title.to_string(),
            url: url.to_string(),
            category: category.to_string(),
            publish_date: now,
            embedding,
            post_id,
            last_verified: now,
            update_count: 0,
        });
        self.persist()?;
        Ok(())
    }

    /// Two-phase duplicate test. Phase 1 is the cheap, always-available
    /// lexical guard; phase 2 submits a time-windowed listing of past titles
    /// to a structured judgment call. Judge failure resolves per the
    /// configured fail-open policy.
    pub async fn is_duplicate(&self, candidate: &str, category: &str) -> Result<bool> {
        if self.lexical_duplicate(candidate) {
            info!(candidate, "rejected by lexical duplicate guard");
            return Ok(true);
        }

        match self.judged_duplicate(candidate, category).await {
            Ok(duplicate) => Ok(duplicate),
            Err(e) => {
                warn!(
                    candidate,
                    error = %e,
                    fail_open = self.fail_open,
                    "duplicate judge unavailable, applying fail-open policy"
                );
                Ok(!self.fail_open)
            }
        }
    }

    fn lexical_duplicate(&self, candidate: &str) -> bool {
        let candidate = normalize_title(candidate);
        for entry in &self.entries {
            let stored = normalize_title(&entry.title);
            if strsim::normalized_levenshtein(&candidate, &stored) > LEXICAL_SIMILARITY_THRESHOLD {
                return true;
            }
            if candidate.len() > SUBSTRING_MIN_LEN && stored.contains(&candidate) {
                return true;
            }
        }
        false
    }

    async fn judged_duplicate(&self, candidate: &str, category: &str) -> Result<bool, GenError> {
        let cutoff = Utc::now() - Duration::days(JUDGE_WINDOW_DAYS);
        let mut recent: Vec<&KnowledgeEntry> = self
            .entries
            .iter()
            .filter(|e| e.publish_date >= cutoff)
            .collect();
        recent.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
        recent.truncate(JUDGE_MAX_TITLES);

        if recent.is_empty() {
            return Ok(false);
        }

        let listing: String = recent
            .iter()
            .map(|e| format!("- {} ({})", e.title, e.publish_date.format("%Y-%m-%d")))
            .collect::<Vec<_>>()
            .join("\n");

        let spec = RequestSpec::new(
            Capability::DuplicateJudge,
            format!(
                "Category: {category}\nProposed topic: {candidate}\n\nPreviously published:\n{listing}"
            ),
        )
        .with_system(JUDGE_SYSTEM);

        let value = self.executor.execute(&spec, &["is_duplicate"]).await?;
        let duplicate = value["is_duplicate"].as_bool().unwrap_or(false);
        debug!(candidate, duplicate, "semantic duplicate judgment");
        Ok(duplicate)
    }

    /// Top-k semantically nearest past items, excluding the current title,
    /// for internal cross-reference suggestions.
    pub async fn nearest_related(&self, current_title: &str, k: usize) -> Result<Vec<RelatedLink>> {
        let historical: Vec<&KnowledgeEntry> = self
            .entries
            .iter()
            .filter(|e| !e.embedding.is_empty() && e.title != current_title)
            .collect();
        if historical.is_empty() {
            return Ok(Vec::new());
        }

        let candidate = self.embedder.embed(current_title).await?;
        let mut scored: Vec<(f32, &KnowledgeEntry)> = historical
            .into_iter()
            .map(|e| (cosine_similarity(&candidate, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, e)| RelatedLink {
                title: e.title.clone(),
                url: e.url.clone(),
            })
            .collect())
    }

    /// Maintenance path: bump `last_verified` and `update_count` for an
    /// existing entry. Returns false when the URL is unknown.
    pub fn refresh(&mut self, url: &str) -> Result<bool> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.url == url) else {
            return Ok(false);
        };
        entry.last_verified = Utc::now();
        entry.update_count += 1;
        self.persist()?;
        Ok(true)
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    fn persist(&self) -> Result<()> {
        store::save(&self.path, &self.entries)?;
        Ok(())
    }
}

/// Versioned-record upgrade step: compute embeddings for entries that lack
/// one. Idempotent and safe to interrupt: entries that fail stay empty and
/// are retried at the next load.
async fn upgrade_entries(
    mut entries: Vec<KnowledgeEntry>,
    embedder: &dyn TextEmbedder,
) -> (Vec<KnowledgeEntry>, bool) {
    let mut dirty = false;
    for entry in entries.iter_mut() {
        if !entry.embedding.is_empty() {
            continue;
        }
        match embedder.embed(&entry.title).await {
            Ok(embedding) => {
                entry.embedding = embedding;
                dirty = true;
            }
            Err(e) => {
                warn!(title = entry.title.as_str(), error = %e, "embedding backfill failed, leaving entry for next load");
            }
        }
    }
    (entries, dirty)
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.25, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_magnitude_independent() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![2.0, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_zero_and_mismatched_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn normalize_lowers_and_trims() {
        assert_eq!(normalize_title("  Rust 1.80 Released "), "rust 1.80 released");
    }
}
