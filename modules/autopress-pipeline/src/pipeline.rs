//! The top-level pipeline state machine. Each state is gated on the success
//! of the previous one; a failure aborts the run and returns a failure signal
//! so the caller can try the next topic or category.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use autopress_common::{
    Config, Distributor, DraftPost, PageFetcher, Publisher, RelatedLink, TextEmbedder,
};
use gen_client::{Capability, Executor, RequestSpec};

use crate::assets::AssetResolver;
use crate::audit::AuditLoop;
use crate::evidence::EvidenceCollector;
use crate::memory::KnowledgeStore;
use crate::plan::{PlannedTopic, Planner};
use crate::synthesis::Synthesizer;

const RELATED_LINKS_K: usize = 5;

const DISCOVERY_SYSTEM: &str = "\
Using external search, propose one fresh, concrete article topic for the \
given category, anchored on a verifiable recent development. Include the \
official source URL when one exists. \
Return JSON: {\"topic\": \"...\", \"verified_url\": \"https://...\" or null}.";

/// Terminal state of one pipeline run.
#[derive(Debug)]
pub enum RunOutcome {
    Published {
        url: String,
        post_id: String,
        audit_iterations: u32,
    },
    /// The topic was rejected before expensive work (duplicate guard).
    Skipped { reason: String },
    /// A gated state failed; the caller should try the next topic/category.
    Failed { reason: String },
}

/// Counters for one run, logged at the end.
#[derive(Debug, Default)]
pub struct RunStats {
    pub sources_used: u32,
    pub blueprint_sections: u32,
    pub related_links: u32,
    pub audit_iterations: u32,
    pub audit_converged: bool,
    pub final_score: f64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Pipeline Run Complete ===")?;
        writeln!(f, "Sources used:       {}", self.sources_used)?;
        writeln!(f, "Blueprint sections: {}", self.blueprint_sections)?;
        writeln!(f, "Related links:      {}", self.related_links)?;
        writeln!(f, "Audit iterations:   {}", self.audit_iterations)?;
        writeln!(f, "Audit converged:    {}", self.audit_converged)?;
        write!(f, "Final score:        {:.1}", self.final_score)
    }
}

pub struct Pipeline {
    executor: Executor,
    memory: KnowledgeStore,
    planner: Planner,
    evidence: EvidenceCollector,
    synthesizer: Synthesizer,
    assets: AssetResolver,
    audit: AuditLoop,
    publisher: Arc<dyn Publisher>,
    distributor: Arc<dyn Distributor>,
}

impl Pipeline {
    pub async fn new(
        config: &Config,
        executor: Executor,
        embedder: Arc<dyn TextEmbedder>,
        fetcher: Arc<dyn PageFetcher>,
        publisher: Arc<dyn Publisher>,
        distributor: Arc<dyn Distributor>,
    ) -> Result<Self> {
        let memory = KnowledgeStore::load(
            config.data_dir.join("knowledge.json"),
            embedder,
            executor.clone(),
            config.dedup_fail_open,
        )
        .await?;
        let planner = Planner::load(config.data_dir.join("content_plan.json"), executor.clone());
        let evidence = EvidenceCollector::new(
            executor.clone(),
            fetcher,
            config.feed_urls.clone(),
            config.min_sources,
            config.min_source_chars,
        );
        let audit = AuditLoop::new(
            executor.clone(),
            publisher.clone(),
            config.audit_score_threshold,
            config.audit_max_iterations,
        );

        Ok(Self {
            synthesizer: Synthesizer::new(executor.clone()),
            assets: AssetResolver::new(executor.clone()),
            executor,
            memory,
            planner,
            evidence,
            audit,
            publisher,
            distributor,
        })
    }

    /// Execute one full run for a category.
    pub async fn run(&mut self, category: &str) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let mut stats = RunStats::default();
        info!(%run_id, category, "pipeline run starting");

        // 1. Topic resolution: plan queue, then ad-hoc discovery.
        let topic = match self.resolve_topic(category).await {
            Some(topic) => topic,
            None => {
                return Ok(RunOutcome::Failed {
                    reason: "no topic available".to_string(),
                })
            }
        };
        info!(
            %run_id,
            topic = topic.title.as_str(),
            series_continuation = topic.is_series_continuation,
            "topic resolved"
        );

        // 2. Duplicate guard. Series continuations were vetted at
        // plan-creation time and skip it.
        if !topic.is_series_continuation
            && self.memory.is_duplicate(&topic.title, category).await?
        {
            self.planner.mark_failed(&topic.title);
            return Ok(RunOutcome::Skipped {
                reason: format!("duplicate topic: {}", topic.title),
            });
        }

        // 3. Evidence collection.
        let sources = self
            .evidence
            .collect(&topic.title, topic.verified_url.as_deref())
            .await;
        if sources.is_empty() {
            self.planner.mark_failed(&topic.title);
            return Ok(RunOutcome::Failed {
                reason: format!("no usable sources for: {}", topic.title),
            });
        }
        stats.sources_used = sources.len() as u32;

        // 4. Structured synthesis: blueprint, then body.
        let blueprint = match self.synthesizer.blueprint(&topic.title, &sources).await {
            Ok(blueprint) => blueprint,
            Err(e) => {
                self.planner.mark_failed(&topic.title);
                return Ok(RunOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };
        stats.blueprint_sections = blueprint.sections.len() as u32;

        let body = match self
            .synthesizer
            .body(&topic.title, &blueprint, &sources)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                self.planner.mark_failed(&topic.title);
                return Ok(RunOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        // 5. Asset resolution. Degrades internally, never aborts.
        let body = self.assets.resolve(body, &topic.title, &sources).await;

        // Internal cross-links from the memory.
        let related = self
            .memory
            .nearest_related(&topic.title, RELATED_LINKS_K)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "related-link lookup failed, omitting");
                Vec::new()
            });
        stats.related_links = related.len() as u32;
        let body = append_related(body, &related);

        // 6. Publish.
        let draft = DraftPost {
            title: blueprint.headline.clone(),
            body: body.clone(),
            categories: vec![category.to_string()],
        };
        let published = match self.publisher.publish(&draft).await {
            Ok(Some(published)) => published,
            Ok(None) => {
                self.planner.mark_failed(&topic.title);
                return Ok(RunOutcome::Failed {
                    reason: "publisher returned no identifier".to_string(),
                });
            }
            Err(e) => {
                self.planner.mark_failed(&topic.title);
                return Ok(RunOutcome::Failed {
                    reason: format!("publish failed: {e}"),
                });
            }
        };
        info!(%run_id, url = published.url.as_str(), post_id = published.post_id.as_str(), "published");

        // 7. Audit-remedy loop. Bounded, never a hard failure.
        let outcome = self
            .audit
            .run(&published.post_id, &draft.title, body)
            .await;
        stats.audit_iterations = outcome.iterations;
        stats.audit_converged = outcome.converged;
        stats.final_score = outcome.final_score;

        // 8. Memory update and distribution. The content is already live,
        // so failures here are logged, not fatal.
        if let Err(e) = self
            .memory
            .record(
                &topic.title,
                &published.url,
                category,
                Some(published.post_id.clone()),
            )
            .await
        {
            warn!(%run_id, error = %e, "failed to record knowledge entry");
        }
        if let Err(e) = self.distributor.notify(&published).await {
            warn!(%run_id, error = %e, "distribution failed");
        }

        info!(%run_id, "{stats}");
        Ok(RunOutcome::Published {
            url: published.url,
            post_id: published.post_id,
            audit_iterations: outcome.iterations,
        })
    }

    pub fn memory(&self) -> &KnowledgeStore {
        &self.memory
    }

    async fn resolve_topic(&mut self, category: &str) -> Option<PlannedTopic> {
        match self.planner.next_topic(category).await {
            Ok(Some(topic)) => return Some(topic),
            Ok(None) => {}
            Err(e) => warn!(category, error = %e, "plan queue failed, trying ad-hoc discovery"),
        }
        self.discover_topic(category).await
    }

    /// Ad-hoc topic discovery, the fallback when no series is available.
    async fn discover_topic(&self, category: &str) -> Option<PlannedTopic> {
        let spec = RequestSpec::new(Capability::TopicDiscovery, format!("Category: {category}"))
            .with_system(DISCOVERY_SYSTEM)
            .with_search();

        match self.executor.execute(&spec, &["topic"]).await {
            Ok(value) => {
                let title = value["topic"].as_str()?.to_string();
                let verified_url = value["verified_url"].as_str().map(String::from);
                Some(PlannedTopic {
                    title,
                    is_series_continuation: false,
                    verified_url,
                })
            }
            Err(e) => {
                warn!(category, error = %e, "ad-hoc topic discovery failed");
                None
            }
        }
    }
}

fn append_related(body: String, related: &[RelatedLink]) -> String {
    if related.is_empty() {
        return body;
    }
    let mut out = body;
    out.push_str("\n\n## Related reading\n");
    for link in related {
        out.push_str(&format!("- [{}]({})\n", link.title, link.url));
    }
    out
}
