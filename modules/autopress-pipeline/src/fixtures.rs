//! Scripted collaborators for tests. Each one is deterministic and records
//! what it was asked, so tests can assert on interaction counts as well as
//! outcomes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use autopress_common::{
    Distributor, DraftPost, FetchedPage, PageFetcher, PublishedPost, Publisher, TextEmbedder,
};
use gen_client::provider::GenProvider;
use gen_client::{
    Capability, Executor, GenError, KeyPool, RequestSpec, ResilienceContext, RetryPolicy,
};

/// One scripted provider reaction.
#[derive(Debug, Clone)]
pub enum Scripted {
    Body(String),
    Quota,
    Overloaded,
}

/// Generative provider driven entirely by a per-capability script. Queued
/// responses are consumed once; sticky responses repeat. An unscripted
/// capability panics, which keeps tests honest about what they exercise.
#[derive(Default)]
pub struct ScriptedProvider {
    queued: Mutex<HashMap<Capability, VecDeque<Scripted>>>,
    sticky: Mutex<HashMap<Capability, Scripted>>,
    log: Mutex<Vec<Capability>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(self: &Arc<Self>, capability: Capability, body: &str) -> Arc<Self> {
        self.queued
            .lock()
            .unwrap()
            .entry(capability)
            .or_default()
            .push_back(Scripted::Body(body.to_string()));
        self.clone()
    }

    pub fn respond_always(self: &Arc<Self>, capability: Capability, body: &str) -> Arc<Self> {
        self.sticky
            .lock()
            .unwrap()
            .insert(capability, Scripted::Body(body.to_string()));
        self.clone()
    }

    pub fn fail_always(self: &Arc<Self>, capability: Capability) -> Arc<Self> {
        self.sticky
            .lock()
            .unwrap()
            .insert(capability, Scripted::Overloaded);
        self.clone()
    }

    /// Total generation calls issued so far.
    pub fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn calls_for(&self, capability: Capability) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == capability)
            .count()
    }
}

#[async_trait]
impl GenProvider for ScriptedProvider {
    async fn generate(&self, _api_key: &str, spec: &RequestSpec) -> Result<String, GenError> {
        self.log.lock().unwrap().push(spec.capability);

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&spec.capability)
            .and_then(VecDeque::pop_front);
        let step = match queued {
            Some(step) => step,
            None => self
                .sticky
                .lock()
                .unwrap()
                .get(&spec.capability)
                .cloned()
                .unwrap_or_else(|| panic!("no scripted response for capability {}", spec.capability)),
        };

        match step {
            Scripted::Body(body) => Ok(body),
            Scripted::Quota => Err(GenError::Quota("scripted 429".to_string())),
            Scripted::Overloaded => Err(GenError::Overloaded("scripted 503".to_string())),
        }
    }

    async fn embed(&self, _api_key: &str, text: &str) -> Result<Vec<f32>, GenError> {
        Ok(embedding_of(text))
    }
}

/// Deterministic pseudo-embedding: a character histogram, so lexically
/// similar titles land close under cosine similarity.
pub fn embedding_of(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 32];
    for c in text.to_lowercase().chars().filter(|c| c.is_alphanumeric()) {
        v[(c as usize) % 32] += 1.0;
    }
    v
}

pub struct StaticEmbedder;

#[async_trait]
impl TextEmbedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embedding_of(text))
    }
}

/// Embedder that always fails, for exercising backfill/record degradation.
pub struct FailingEmbedder;

#[async_trait]
impl TextEmbedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("embedding service down")
    }
}

/// Page fetcher backed by a static URL → page map.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, FetchedPage>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, title: &str, text: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                final_url: url.to_string(),
                title: title.to_string(),
                text: text.to_string(),
                image_url: None,
                media: Vec::new(),
            },
        );
        self
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedPage>> {
        Ok(self.pages.get(url).cloned())
    }
}

/// Publisher returning a fixed result and recording every interaction.
pub struct ScriptedPublisher {
    result: Option<PublishedPost>,
    published: Mutex<Vec<DraftPost>>,
    updates: Mutex<Vec<(String, String)>>,
}

impl ScriptedPublisher {
    pub fn new(result: Option<PublishedPost>) -> Arc<Self> {
        Arc::new(Self {
            result,
            published: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub fn published(&self) -> Vec<DraftPost> {
        self.published.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, post: &DraftPost) -> Result<Option<PublishedPost>> {
        self.published.lock().unwrap().push(post.clone());
        Ok(self.result.clone())
    }

    async fn update(&self, post_id: &str, body: &str) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((post_id.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct NullDistributor;

#[async_trait]
impl Distributor for NullDistributor {
    async fn notify(&self, _post: &PublishedPost) -> Result<()> {
        Ok(())
    }
}

/// Executor over a scripted provider with a tight retry policy so failure
/// paths finish quickly under paused time.
pub fn test_executor(provider: Arc<dyn GenProvider>, keys: &[&str]) -> Executor {
    let ctx = Arc::new(tokio::sync::Mutex::new(ResilienceContext::new(KeyPool::new(
        keys.iter().map(|k| k.to_string()).collect(),
    ))));
    Executor::new(provider, ctx).with_policy(RetryPolicy {
        max_attempts: 3,
        base: Duration::from_millis(5),
        cap: Duration::from_millis(20),
    })
}
