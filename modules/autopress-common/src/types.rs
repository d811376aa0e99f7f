use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One previously published content item, persisted for duplicate prevention
/// and internal cross-linking. `url` is unique across the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub title: String,
    pub url: String,
    pub category: String,
    pub publish_date: DateTime<Utc>,
    /// Semantic embedding of the title. Empty for legacy entries until
    /// backfilled at load time.
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub post_id: Option<String>,
    pub last_verified: DateTime<Utc>,
    #[serde(default)]
    pub update_count: u32,
}

/// Persistent multi-part topic queue. One discovery event can seed a series
/// consumed one topic per pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentPlan {
    pub active_series_name: Option<String>,
    pub queue: VecDeque<String>,
    pub completed: Vec<String>,
    pub last_generated_date: Option<DateTime<Utc>>,
}

/// A fetched and validated evidence source. Lives for one pipeline run.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub title: String,
    pub url: String,
    pub raw_text: String,
    pub image_url: Option<String>,
    pub media_assets: Vec<String>,
    pub domain: String,
}

/// What the auditor returns for one audit iteration. Consumed immediately by
/// the remedy step, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuditReport {
    pub quality_score: f64,
    pub verdict: String,
    #[serde(default)]
    pub critical_issues: Vec<String>,
    #[serde(default)]
    pub missing_facts: Vec<String>,
    #[serde(default)]
    pub suggestions: String,
}

/// Section-by-section outline produced before prose synthesis. Every piece of
/// evidence is assigned to a section by index.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Blueprint {
    pub headline: String,
    #[serde(default)]
    pub standfirst: String,
    #[serde(default)]
    pub sections: Vec<BlueprintSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BlueprintSection {
    pub heading: String,
    /// 1-based source numbers backing this section, matching the numbered
    /// evidence bundle given to the model.
    #[serde(default)]
    pub evidence_refs: Vec<usize>,
    /// Placeholder token for an asset this section should carry.
    #[serde(default)]
    pub asset_slot: Option<String>,
}

/// A finished document handed to the publishing collaborator.
#[derive(Debug, Clone)]
pub struct DraftPost {
    pub title: String,
    pub body: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub url: String,
    pub post_id: String,
}

/// A cross-reference suggestion from the deduplication memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedLink {
    pub title: String,
    pub url: String,
}

/// Result of resolving one URL through the page-fetch collaborator.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    pub media: Vec<String>,
}
