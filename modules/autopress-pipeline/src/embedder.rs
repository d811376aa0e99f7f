use anyhow::Result;
use async_trait::async_trait;

use autopress_common::TextEmbedder;
use gen_client::Executor;

/// Embedding capability routed through the shared executor, so embedding
/// calls observe the same throttle and credential rotation as generation.
pub struct ExecutorEmbedder {
    executor: Executor,
}

impl ExecutorEmbedder {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl TextEmbedder for ExecutorEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.executor.embed(text).await?)
    }
}
