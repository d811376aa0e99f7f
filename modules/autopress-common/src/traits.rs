use anyhow::Result;
use async_trait::async_trait;

use crate::types::{DraftPost, FetchedPage, PublishedPost};

/// Text-to-vector embedding capability.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Resolves a URL to extracted page content. Returns `None` when the page
/// could not be fetched or yielded nothing usable.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedPage>>;
}

/// Publishing collaborator. `publish` returns `None` when the platform
/// accepted the request but produced no identifier (treated as failure by the
/// orchestrator); `update` replaces the body of an already-published post.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, post: &DraftPost) -> Result<Option<PublishedPost>>;
    async fn update(&self, post_id: &str, body: &str) -> Result<()>;
}

/// Post-publish distribution (webhooks, social, ...). Failures here are
/// logged by the caller, never fatal, since the content is already live.
#[async_trait]
pub trait Distributor: Send + Sync {
    async fn notify(&self, post: &PublishedPost) -> Result<()>;
}
