//! Multi-strategy evidence collection. Strategies are tried in a fixed
//! fallback order until enough usable sources are gathered; every candidate
//! URL is fetched and length-validated before it counts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use autopress_common::{PageFetcher, SourceRecord};
use gen_client::{Capability, Executor, RequestSpec};

const FEED_MAX_ITEMS_PER_FEED: usize = 20;
const SEARCH_HUNT_MAX_CANDIDATES: usize = 10;

const DEEP_RESEARCH_SYSTEM: &str = "\
You are a research assistant. Using external search, find high-value sources \
for the given topic: official announcements, primary documentation, \
reputable independent coverage. \
Return JSON: {\"sources\": [{\"url\": \"...\", \"category\": \"official|docs|coverage\"}]}.";

const SEARCH_HUNT_SYSTEM: &str = "\
Using external search, list candidate URLs likely to cover the topic. \
Cast a wide net; vetting happens separately. \
Return JSON: {\"candidates\": [\"url\", ...]}.";

const VETTING_SYSTEM: &str = "\
Given a topic and candidate URLs, keep only URLs that plausibly contain \
substantive, first-party or reputable coverage of the topic. Drop link farms, \
forums, and tangential pages. \
Return JSON: {\"approved\": [\"url\", ...]}.";

/// Counters for one collection pass.
#[derive(Debug, Default)]
pub struct EvidenceStats {
    pub candidates_seen: u32,
    pub fetch_failures: u32,
    pub too_short: u32,
    pub admitted: u32,
}

pub struct EvidenceCollector {
    executor: Executor,
    fetcher: Arc<dyn PageFetcher>,
    feeds: Vec<String>,
    min_sources: usize,
    min_chars: usize,
    http: reqwest::Client,
}

impl EvidenceCollector {
    pub fn new(
        executor: Executor,
        fetcher: Arc<dyn PageFetcher>,
        feeds: Vec<String>,
        min_sources: usize,
        min_chars: usize,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build feed HTTP client");
        Self {
            executor,
            fetcher,
            feeds,
            min_sources,
            min_chars,
            http,
        }
    }

    /// Run the fallback chain. The returned list may be empty; aborting on
    /// zero sources is the orchestrator's call.
    pub async fn collect(
        &self,
        topic: &str,
        verified_url: Option<&str>,
    ) -> Vec<SourceRecord> {
        let mut sources = Vec::new();
        let mut seen = HashSet::new();
        let mut stats = EvidenceStats::default();

        // (a) A verified official source carried with the topic outranks
        // everything else.
        if let Some(url) = verified_url {
            self.admit(url, &mut sources, &mut seen, &mut stats).await;
        }
        if sources.len() >= self.min_sources {
            info!(strategy = "verified_url", sources = sources.len(), "evidence quota met");
            return sources;
        }

        // (b) Structured deep research.
        match self.deep_research(topic).await {
            Ok(urls) => {
                for url in urls {
                    self.admit(&url, &mut sources, &mut seen, &mut stats).await;
                    if sources.len() >= self.min_sources {
                        break;
                    }
                }
            }
            Err(e) => warn!(topic, error = %e, "deep research strategy failed"),
        }
        if sources.len() >= self.min_sources {
            info!(strategy = "deep_research", sources = sources.len(), "evidence quota met");
            return sources;
        }

        // (c) Strict feed resolver: items whose title carries the full topic.
        for url in self.feed_candidates(topic, true).await {
            self.admit(&url, &mut sources, &mut seen, &mut stats).await;
            if sources.len() >= self.min_sources {
                info!(strategy = "feed_strict", sources = sources.len(), "evidence quota met");
                return sources;
            }
        }

        // (d) Generative search hunt with a separate vetting judgment.
        match self.search_hunt(topic).await {
            Ok(urls) => {
                for url in urls {
                    self.admit(&url, &mut sources, &mut seen, &mut stats).await;
                    if sources.len() >= self.min_sources {
                        break;
                    }
                }
            }
            Err(e) => warn!(topic, error = %e, "search hunt strategy failed"),
        }
        if sources.len() >= self.min_sources {
            info!(strategy = "search_hunt", sources = sources.len(), "evidence quota met");
            return sources;
        }

        // (e) Plain feed search: any item mentioning a topic term.
        for url in self.feed_candidates(topic, false).await {
            self.admit(&url, &mut sources, &mut seen, &mut stats).await;
            if sources.len() >= self.min_sources {
                break;
            }
        }

        info!(
            topic,
            candidates = stats.candidates_seen,
            fetch_failures = stats.fetch_failures,
            too_short = stats.too_short,
            admitted = stats.admitted,
            "evidence collection finished"
        );
        sources
    }

    /// Fetch one candidate and admit it if the extracted text meets the
    /// minimum length.
    async fn admit(
        &self,
        url: &str,
        sources: &mut Vec<SourceRecord>,
        seen: &mut HashSet<String>,
        stats: &mut EvidenceStats,
    ) {
        if !seen.insert(url.to_string()) {
            return;
        }
        stats.candidates_seen += 1;

        let page = match self.fetcher.fetch(url).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                stats.fetch_failures += 1;
                return;
            }
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                stats.fetch_failures += 1;
                return;
            }
        };

        if page.text.len() < self.min_chars {
            warn!(url, chars = page.text.len(), "page text below minimum, skipping");
            stats.too_short += 1;
            return;
        }

        stats.admitted += 1;
        sources.push(SourceRecord {
            title: page.title,
            domain: extract_domain(&page.final_url),
            url: page.final_url,
            raw_text: page.text,
            image_url: page.image_url,
            media_assets: page.media,
        });
    }

    async fn deep_research(&self, topic: &str) -> Result<Vec<String>> {
        let spec = RequestSpec::new(Capability::DeepResearch, format!("Topic: {topic}"))
            .with_system(DEEP_RESEARCH_SYSTEM)
            .with_search();
        let value = self.executor.execute(&spec, &["sources"]).await?;

        Ok(value["sources"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|s| s["url"].as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn search_hunt(&self, topic: &str) -> Result<Vec<String>> {
        let spec = RequestSpec::new(Capability::SearchHunt, format!("Topic: {topic}"))
            .with_system(SEARCH_HUNT_SYSTEM)
            .with_search();
        let value = self.executor.execute(&spec, &["candidates"]).await?;

        let candidates: Vec<String> = value["candidates"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .take(SEARCH_HUNT_MAX_CANDIDATES)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let listing = candidates.join("\n");
        let vet = RequestSpec::new(
            Capability::SourceVetting,
            format!("Topic: {topic}\n\nCandidates:\n{listing}"),
        )
        .with_system(VETTING_SYSTEM);
        let value = self.executor.execute(&vet, &["approved"]).await?;

        // Only admit URLs that were actually in the candidate set.
        let candidate_set: HashSet<&str> = candidates.iter().map(String::as_str).collect();
        Ok(value["approved"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter(|u| candidate_set.contains(u))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Scan configured feeds for items matching the topic. `strict` requires
    /// the full topic in the item title; otherwise any significant topic term
    /// qualifies.
    async fn feed_candidates(&self, topic: &str, strict: bool) -> Vec<String> {
        let topic_lower = topic.to_lowercase();
        let terms: Vec<String> = topic_lower
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .map(String::from)
            .collect();

        let mut urls = Vec::new();
        for feed_url in &self.feeds {
            let items = match self.fetch_feed(feed_url).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(feed_url, error = %e, "feed fetch failed");
                    continue;
                }
            };
            for (url, title) in items {
                let title_lower = title.to_lowercase();
                let matched = if strict {
                    title_lower.contains(&topic_lower)
                } else {
                    terms.iter().any(|t| title_lower.contains(t))
                };
                if matched {
                    urls.push(url);
                }
            }
        }
        urls
    }

    /// Fetch and parse an RSS/Atom feed into (url, title) pairs.
    async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<(String, String)>> {
        let resp = self
            .http
            .get(feed_url)
            .header("User-Agent", "autopress/0.1")
            .send()
            .await
            .context("feed fetch failed")?;
        let bytes = resp.bytes().await.context("failed to read feed body")?;
        let feed = feed_rs::parser::parse(&bytes[..]).context("failed to parse RSS/Atom feed")?;

        Ok(feed
            .entries
            .into_iter()
            .take(FEED_MAX_ITEMS_PER_FEED)
            .filter_map(|entry| {
                let url = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                Some((url, title))
            })
            .collect())
    }
}

/// Domain of a URL, for the `SourceRecord` and for log fields.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction_lowercases_host() {
        assert_eq!(extract_domain("https://Example.COM/a/b?x=1"), "example.com");
        assert_eq!(extract_domain("not a url"), "");
    }
}
