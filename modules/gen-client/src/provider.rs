use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::GenError;
use crate::types::RequestSpec;

/// Raw provider seam. The executor owns retries, key rotation, parsing and
/// validation; a provider just issues one call and maps transport failures
/// onto the error taxonomy.
#[async_trait]
pub trait GenProvider: Send + Sync {
    /// Issue one generation/search call and return the raw response body.
    async fn generate(&self, api_key: &str, spec: &RequestSpec) -> Result<String, GenError>;

    /// Embed a single text into a fixed-length vector.
    async fn embed(&self, api_key: &str, text: &str) -> Result<Vec<f32>, GenError>;
}

const DEFAULT_BASE_URL: &str = "https://generativeapi.dev/v1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP implementation against the generative REST API.
pub struct HttpProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
    embed_model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl HttpProvider {
    pub fn new(model: impl Into<String>, embed_model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("Failed to build generative HTTP client");
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            embed_model: embed_model.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(api_key: &str) -> Result<HeaderMap, GenError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| GenError::Other(anyhow::anyhow!("invalid API key header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Map a non-success HTTP status onto the failure taxonomy.
    fn classify(status: reqwest::StatusCode, body: String) -> GenError {
        match status.as_u16() {
            401 | 403 | 429 => GenError::Quota(format!("{status}: {body}")),
            500 | 502 | 503 | 529 => GenError::Overloaded(format!("{status}: {body}")),
            _ => GenError::Other(anyhow::anyhow!("API error ({status}): {body}")),
        }
    }
}

#[async_trait]
impl GenProvider for HttpProvider {
    async fn generate(&self, api_key: &str, spec: &RequestSpec) -> Result<String, GenError> {
        let url = format!("{}/generate", self.base_url);
        debug!(capability = %spec.capability, "generation request");

        let payload = json!({
            "model": self.model,
            "capability": spec.capability.as_str(),
            "system": spec.system,
            "prompt": spec.prompt,
            "use_search": spec.use_search,
        });

        let response = self
            .http
            .post(&url)
            .headers(Self::headers(api_key)?)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(status, body));
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.text)
    }

    async fn embed(&self, api_key: &str, text: &str) -> Result<Vec<f32>, GenError> {
        let url = format!("{}/embed", self.base_url);

        let response = self
            .http
            .post(&url)
            .headers(Self::headers(api_key)?)
            .json(&json!({ "model": self.embed_model, "input": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(status, body));
        }

        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_taxonomy() {
        let quota = HttpProvider::classify(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(quota, GenError::Quota(_)));

        let overload =
            HttpProvider::classify(reqwest::StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert!(matches!(overload, GenError::Overloaded(_)));

        let other = HttpProvider::classify(reqwest::StatusCode::BAD_REQUEST, String::new());
        assert!(matches!(other, GenError::Other(_)));
    }
}
