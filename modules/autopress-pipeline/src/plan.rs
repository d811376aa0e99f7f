//! Persistent content-plan queue: one discovery event can seed a multi-part
//! series, consumed one topic per pipeline run.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use autopress_common::ContentPlan;
use gen_client::{Capability, Executor, RequestSpec};

use crate::store;

const SERIES_PARTS: usize = 3;

const SERIES_SYSTEM: &str = "\
You plan short article series. Given a category, find one verifiable, recent \
factual anchor (a release, announcement, or published report, confirmed via \
search) and derive an ordered series of exactly 3 article topics that share \
that anchor. Topics must be self-contained headlines. \
Return JSON: {\"series_name\": \"...\", \"anchor\": \"...\", \"parts\": [\"...\", \"...\", \"...\"]}.";

/// A topic handed to the orchestrator for one run.
#[derive(Debug, Clone)]
pub struct PlannedTopic {
    pub title: String,
    /// Series continuations were vetted at plan-creation time and skip the
    /// duplicate guard.
    pub is_series_continuation: bool,
    pub verified_url: Option<String>,
}

pub struct Planner {
    path: PathBuf,
    plan: ContentPlan,
    executor: Executor,
}

impl Planner {
    pub fn load(path: PathBuf, executor: Executor) -> Self {
        let plan = store::load_or_default(&path, "content plan");
        Self {
            path,
            plan,
            executor,
        }
    }

    /// Dequeue the next series topic, generating a fresh series when none is
    /// active. Returns `None` when plan generation fails, signalling the
    /// orchestrator to fall back to ad-hoc discovery.
    pub async fn next_topic(&mut self, category: &str) -> Result<Option<PlannedTopic>> {
        if !self.plan.queue.is_empty() {
            if self.plan.active_series_name.is_none() {
                warn!("queued topics without an active series name, draining anyway");
            }
            return Ok(Some(self.dequeue()?));
        }

        match self.generate_series(category).await {
            Ok(Some((name, parts))) => {
                info!(series = name.as_str(), parts = parts.len(), "new series planned");
                self.plan.active_series_name = Some(name);
                self.plan.queue = parts.into();
                self.plan.last_generated_date = Some(Utc::now());
                Ok(Some(self.dequeue()?))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(category, error = %e, "series generation failed, falling back to ad-hoc discovery");
                Ok(None)
            }
        }
    }

    /// Discard a failed topic. Deliberately no requeue: retry-in-place would
    /// loop forever on a poisoned topic.
    pub fn mark_failed(&mut self, topic: &str) {
        info!(topic, "topic discarded after failed run");
    }

    pub fn plan(&self) -> &ContentPlan {
        &self.plan
    }

    /// Pop one topic and handle the series-complete transition: draining the
    /// queue moves the series name to `completed` and clears the active slot.
    fn dequeue(&mut self) -> Result<PlannedTopic> {
        let title = self
            .plan
            .queue
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("dequeue called with empty queue"))?;

        if self.plan.queue.is_empty() {
            if let Some(name) = self.plan.active_series_name.take() {
                info!(series = name.as_str(), "series drained, marking complete");
                self.plan.completed.push(name);
            }
        }
        self.persist()?;

        Ok(PlannedTopic {
            title,
            is_series_continuation: true,
            verified_url: None,
        })
    }

    async fn generate_series(&self, category: &str) -> Result<Option<(String, Vec<String>)>> {
        let spec = RequestSpec::new(
            Capability::SeriesPlan,
            format!("Category: {category}\nPlan a {SERIES_PARTS}-part series."),
        )
        .with_system(SERIES_SYSTEM)
        .with_search();

        let value = self.executor.execute(&spec, &["series_name", "parts"]).await?;

        let name = value["series_name"].as_str().unwrap_or_default().to_string();
        let parts: Vec<String> = value["parts"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        if name.is_empty() || parts.is_empty() {
            warn!(category, "series plan response was empty");
            return Ok(None);
        }
        Ok(Some((name, parts)))
    }

    fn persist(&self) -> Result<()> {
        store::save(&self.path, &self.plan)?;
        Ok(())
    }
}
