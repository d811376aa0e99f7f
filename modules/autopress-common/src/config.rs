use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ordered generative-API credentials, consumed via rotation on quota failures.
    pub genai_api_keys: Vec<String>,

    /// Directory holding the knowledge store and content plan files.
    pub data_dir: PathBuf,

    /// Base URL of the publishing site (REST publisher).
    pub site_base_url: String,

    /// Optional webhook notified after a successful publish.
    pub distribution_webhook: Option<String>,

    /// RSS/Atom feeds consulted by the feed-based evidence strategies.
    pub feed_urls: Vec<String>,

    /// Generation and embedding model identifiers sent to the provider.
    pub gen_model: String,
    pub embed_model: String,

    // Tunables
    pub audit_score_threshold: f64,
    pub audit_max_iterations: u32,
    /// When the semantic duplicate judge is unreachable, let the candidate
    /// through (true) or reject it (false).
    pub dedup_fail_open: bool,
    pub min_source_chars: usize,
    pub min_sources: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            genai_api_keys: split_list(&required_env("GENAI_API_KEYS")),
            data_dir: PathBuf::from(
                env::var("AUTOPRESS_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            site_base_url: required_env("SITE_BASE_URL"),
            distribution_webhook: env::var("DISTRIBUTION_WEBHOOK").ok(),
            feed_urls: env::var("FEED_URLS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            gen_model: env::var("GEN_MODEL").unwrap_or_else(|_| "gen-large-2".to_string()),
            embed_model: env::var("EMBED_MODEL").unwrap_or_else(|_| "embed-3".to_string()),
            audit_score_threshold: parse_env("AUDIT_SCORE_THRESHOLD", 9.0),
            audit_max_iterations: parse_env("AUDIT_MAX_ITERATIONS", 3),
            dedup_fail_open: parse_env("DEDUP_FAIL_OPEN", true),
            min_source_chars: parse_env("MIN_SOURCE_CHARS", 500),
            min_sources: parse_env("MIN_SOURCES", 1),
        }
    }
}

fn required_env(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("{name} environment variable must be set"))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empties() {
        assert_eq!(split_list("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
