//! Structured synthesis: a blueprint call assigning every piece of evidence
//! to a section, then a prose body conforming to it.

use autopress_common::{AutopressError, Blueprint, SourceRecord};
use gen_client::parse::truncate_to_char_boundary;
use gen_client::{Capability, Executor, RequestSpec};
use tracing::info;

const SOURCE_EXCERPT_MAX_BYTES: usize = 8_000;

const BLUEPRINT_SYSTEM: &str = "\
You are an editor planning an article. Given a topic and evidence sources \
numbered from 1, produce a section-by-section outline. Every source number \
must be assigned to at least one section via evidence_refs. Use asset_slot to \
request a visual: \"[ASSET:cover]\", \"[ASSET:source-N]\" (N is the source \
number), or \"[ASSET:viz]\". \
Return JSON: {\"headline\": \"...\", \"standfirst\": \"...\", \"sections\": \
[{\"heading\": \"...\", \"evidence_refs\": [1], \"asset_slot\": null}]}.";

const BODY_SYSTEM: &str = "\
You are a writer producing the article body for a fixed outline. Write \
markdown, one section per outline entry, grounded strictly in the assigned \
evidence. Keep asset placeholder tokens exactly as given in the outline. \
Return JSON: {\"body\": \"...\"}.";

pub struct Synthesizer {
    executor: Executor,
}

impl Synthesizer {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Request the outline. A blueprint without sections is a synthesis
    /// failure: there is nothing to write against.
    pub async fn blueprint(
        &self,
        topic: &str,
        sources: &[SourceRecord],
    ) -> Result<Blueprint, AutopressError> {
        let spec = RequestSpec::new(
            Capability::Blueprint,
            format!("Topic: {topic}\n\n{}", source_digest(sources)),
        )
        .with_system(BLUEPRINT_SYSTEM);

        let value = self
            .executor
            .execute(&spec, &["headline", "sections"])
            .await
            .map_err(|e| AutopressError::Synthesis(format!("blueprint call failed: {e}")))?;

        let blueprint: Blueprint = serde_json::from_value(value)
            .map_err(|e| AutopressError::Synthesis(format!("blueprint shape invalid: {e}")))?;

        if blueprint.sections.is_empty() {
            return Err(AutopressError::Synthesis(
                "blueprint has no sections".to_string(),
            ));
        }
        info!(
            topic,
            headline = blueprint.headline.as_str(),
            sections = blueprint.sections.len(),
            "blueprint accepted"
        );
        Ok(blueprint)
    }

    /// Request the prose body conforming to the blueprint.
    pub async fn body(
        &self,
        topic: &str,
        blueprint: &Blueprint,
        sources: &[SourceRecord],
    ) -> Result<String, AutopressError> {
        let outline = serde_json::to_string_pretty(blueprint)
            .map_err(|e| AutopressError::Synthesis(format!("outline serialization: {e}")))?;

        let spec = RequestSpec::new(
            Capability::Body,
            format!(
                "Topic: {topic}\n\nOutline:\n{outline}\n\n{}",
                source_digest(sources)
            ),
        )
        .with_system(BODY_SYSTEM);

        let value = self
            .executor
            .execute(&spec, &["body"])
            .await
            .map_err(|e| AutopressError::Synthesis(format!("body call failed: {e}")))?;

        let body = value["body"].as_str().unwrap_or_default().to_string();
        if body.trim().is_empty() {
            return Err(AutopressError::Synthesis("body was empty".to_string()));
        }
        Ok(body)
    }
}

/// Numbered evidence bundle shared by both synthesis calls. Numbering is
/// 1-based to match the `[ASSET:source-N]` placeholder scheme. Excerpts are
/// truncated so a handful of long pages can't blow the prompt.
fn source_digest(sources: &[SourceRecord]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "--- Source {} ---\nTitle: {}\nURL: {}\nDomain: {}\n\n{}",
                i + 1,
                s.title,
                s.url,
                s.domain,
                truncate_to_char_boundary(&s.raw_text, SOURCE_EXCERPT_MAX_BYTES)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_numbers_sources_from_one() {
        let sources = vec![
            SourceRecord {
                title: "First".to_string(),
                url: "https://a.example/1".to_string(),
                raw_text: "alpha".to_string(),
                image_url: None,
                media_assets: Vec::new(),
                domain: "a.example".to_string(),
            },
            SourceRecord {
                title: "Second".to_string(),
                url: "https://b.example/2".to_string(),
                raw_text: "beta".to_string(),
                image_url: None,
                media_assets: Vec::new(),
                domain: "b.example".to_string(),
            },
        ];

        let digest = source_digest(&sources);
        assert!(digest.starts_with("--- Source 1 ---"));
        assert!(digest.contains("--- Source 2 ---"));
        assert!(!digest.contains("--- Source 0 ---"));
    }
}
