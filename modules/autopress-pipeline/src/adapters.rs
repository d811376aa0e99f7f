//! Concrete collaborator implementations for the binary: a reqwest-based
//! page fetcher with Readability extraction, a REST publisher, and a webhook
//! distributor. Thin I/O shims; all interesting logic lives behind the
//! traits they implement.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{info, warn};

use autopress_common::{Distributor, DraftPost, FetchedPage, PageFetcher, PublishedPost, Publisher};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "autopress/0.1";

/// Fetches a page over HTTP and reduces it to readable main content.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to build fetcher HTTP client");
        Self { http }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedPage>> {
        let parsed = url::Url::parse(url).context("invalid URL")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("only http/https URLs are allowed, got: {}", parsed.scheme());
        }

        let response = match self
            .http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "page fetch failed");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            warn!(url, status = %response.status(), "page fetch non-success");
            return Ok(None);
        }

        let final_url = response.url().to_string();
        let html = response.bytes().await.context("failed to read page body")?;
        if html.is_empty() {
            return Ok(None);
        }
        let html_text = String::from_utf8_lossy(&html).into_owned();

        let parsed_final = url::Url::parse(&final_url).ok();
        let config = TransformConfig {
            readability: true,
            main_content: true,
            return_format: ReturnFormat::Markdown,
            filter_images: false,
            filter_svg: true,
            clean_html: true,
        };
        let input = TransformInput {
            url: parsed_final.as_ref(),
            content: html.as_ref(),
            screenshot_bytes: None,
            encoding: None,
            selector_config: None,
            ignore_tags: None,
        };
        let text = transform_content_input(input, &config);
        if text.trim().is_empty() {
            warn!(url, "empty content after Readability extraction");
            return Ok(None);
        }

        let image_url = extract_meta_content(&html_text, "og:image");
        info!(url, bytes = text.len(), "page fetched");
        Ok(Some(FetchedPage {
            title: extract_title(&html_text).unwrap_or_else(|| final_url.clone()),
            final_url,
            text,
            media: image_url.iter().cloned().collect(),
            image_url,
        }))
    }
}

/// First `<title>` element of an HTML document.
fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let open = lower.find("<title")?;
    let start = lower[open..].find('>')? + open + 1;
    let end = lower[start..].find("</title")? + start;
    let title = html[start..end].trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Content attribute of a `<meta property="...">` tag, e.g. `og:image`.
fn extract_meta_content(html: &str, property: &str) -> Option<String> {
    let needle = format!("property=\"{property}\"");
    let pos = html.find(&needle)?;
    let tag_end = html[pos..].find('>')? + pos;
    let tag = &html[pos..tag_end];
    let content_pos = tag.find("content=\"")? + "content=\"".len();
    let content_end = tag[content_pos..].find('"')? + content_pos;
    let value = tag[content_pos..content_end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Publishing collaborator speaking the site's REST API.
pub struct RestPublisher {
    http: reqwest::Client,
    base_url: String,
}

#[derive(serde::Deserialize)]
struct PublishResponse {
    url: Option<String>,
    id: Option<String>,
}

impl RestPublisher {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build publisher HTTP client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Publisher for RestPublisher {
    async fn publish(&self, post: &DraftPost) -> Result<Option<PublishedPost>> {
        let response = self
            .http
            .post(format!("{}/api/posts", self.base_url))
            .json(&serde_json::json!({
                "title": post.title,
                "body": post.body,
                "categories": post.categories,
            }))
            .send()
            .await
            .context("publish request failed")?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "publish rejected");
            return Ok(None);
        }

        let parsed: PublishResponse = response.json().await.context("publish response shape")?;
        match (parsed.url, parsed.id) {
            (Some(url), Some(post_id)) => Ok(Some(PublishedPost { url, post_id })),
            _ => Ok(None),
        }
    }

    async fn update(&self, post_id: &str, body: &str) -> Result<()> {
        let response = self
            .http
            .put(format!("{}/api/posts/{post_id}", self.base_url))
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .context("update request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("update rejected with status {}", response.status());
        }
        Ok(())
    }
}

/// Optional post-publish webhook. Configured off means notify is a no-op.
pub struct WebhookDistributor {
    http: reqwest::Client,
    webhook: Option<String>,
}

impl WebhookDistributor {
    pub fn new(webhook: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build distributor HTTP client");
        Self { http, webhook }
    }
}

#[async_trait]
impl Distributor for WebhookDistributor {
    async fn notify(&self, post: &PublishedPost) -> Result<()> {
        let Some(webhook) = &self.webhook else {
            return Ok(());
        };
        self.http
            .post(webhook)
            .json(&serde_json::json!({ "url": post.url, "post_id": post.post_id }))
            .send()
            .await
            .context("distribution webhook failed")?
            .error_for_status()
            .context("distribution webhook rejected")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_extraction_handles_attributes_and_absence() {
        assert_eq!(
            extract_title("<html><title lang=\"en\"> Hello </title></html>"),
            Some("Hello".to_string())
        );
        assert_eq!(extract_title("<html><body>no title</body></html>"), None);
    }

    #[test]
    fn og_image_extraction() {
        let html = r#"<meta property="og:image" content="https://cdn.example/x.png">"#;
        assert_eq!(
            extract_meta_content(html, "og:image"),
            Some("https://cdn.example/x.png".to_string())
        );
        assert_eq!(extract_meta_content(html, "og:video"), None);
    }
}
