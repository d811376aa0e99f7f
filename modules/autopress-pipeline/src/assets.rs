//! Asset resolution: substitute placeholder tokens in the synthesized body
//! with resolved external references. Failures here degrade gracefully: the
//! asset is omitted, never the article.

use autopress_common::SourceRecord;
use gen_client::{Capability, Executor, GenError, RequestSpec};
use tracing::warn;

pub const COVER_TOKEN: &str = "[ASSET:cover]";
pub const VIZ_TOKEN: &str = "[ASSET:viz]";
const TOKEN_PREFIX: &str = "[ASSET:";

const VIZ_SYSTEM: &str = "\
Produce one small illustrative artifact for the article: either a fenced \
code sample or a markdown table of key figures, derived only from the \
provided evidence. Return JSON: {\"markup\": \"...\"}.";

pub struct AssetResolver {
    executor: Executor,
}

impl AssetResolver {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Replace every known placeholder token. Unresolvable tokens are
    /// stripped so no placeholder ever reaches the published document.
    pub async fn resolve(&self, body: String, topic: &str, sources: &[SourceRecord]) -> String {
        let mut body = body;

        if body.contains(COVER_TOKEN) {
            match sources.iter().find_map(|s| s.image_url.clone()) {
                Some(url) => body = body.replace(COVER_TOKEN, &format!("![{topic}]({url})")),
                None => {
                    warn!(topic, "no cover asset available, dropping token");
                    body = body.replace(COVER_TOKEN, "");
                }
            }
        }

        for (i, source) in sources.iter().enumerate() {
            let token = format!("[ASSET:source-{}]", i + 1);
            if !body.contains(&token) {
                continue;
            }
            match &source.image_url {
                Some(url) => {
                    body = body.replace(&token, &format!("![{}]({url})", source.title));
                }
                None => {
                    warn!(url = source.url.as_str(), "source has no inline asset, dropping token");
                    body = body.replace(&token, "");
                }
            }
        }

        if body.contains(VIZ_TOKEN) {
            match self.generate_visualization(topic, sources).await {
                Ok(markup) => body = body.replace(VIZ_TOKEN, &markup),
                Err(e) => {
                    warn!(topic, error = %e, "visualization generation failed, omitting");
                    body = body.replace(VIZ_TOKEN, "");
                }
            }
        }

        // Whatever survives the known substitutions (a misnumbered source
        // token, a slot the model invented) is stripped, not published.
        if body.contains(TOKEN_PREFIX) {
            warn!(topic, "unresolved asset tokens in body, stripping");
            body = strip_asset_tokens(&body);
        }

        body
    }

    async fn generate_visualization(
        &self,
        topic: &str,
        sources: &[SourceRecord],
    ) -> Result<String, GenError> {
        let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
        let spec = RequestSpec::new(
            Capability::Visualization,
            format!("Topic: {topic}\nEvidence titles: {}", titles.join("; ")),
        )
        .with_system(VIZ_SYSTEM);

        let value = self.executor.execute(&spec, &["markup"]).await?;
        Ok(value["markup"].as_str().unwrap_or_default().to_string())
    }
}

/// Remove every remaining `[ASSET:...]` span. Unterminated tokens lose the
/// rest of the line.
fn strip_asset_tokens(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find(TOKEN_PREFIX) {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        match after.find(']') {
            Some(end) => rest = &after[end + 1..],
            None => {
                rest = after.find('\n').map(|nl| &after[nl..]).unwrap_or("");
            }
        }
    }
    out.push_str(rest);
    out
}
