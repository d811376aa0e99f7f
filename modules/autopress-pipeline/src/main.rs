use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use autopress_common::Config;
use autopress_pipeline::adapters::{HttpFetcher, RestPublisher, WebhookDistributor};
use autopress_pipeline::embedder::ExecutorEmbedder;
use autopress_pipeline::{Pipeline, RunOutcome};
use gen_client::{Executor, HttpProvider, KeyPool, ResilienceContext};

#[derive(Parser, Debug)]
#[command(name = "autopress", about = "Automated content pipeline")]
struct Args {
    /// Content category to generate for.
    #[arg(long, default_value = "technology")]
    category: String,

    /// Categories tried in order if the primary one yields nothing.
    #[arg(long = "fallback-category")]
    fallback_categories: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("autopress=info".parse()?))
        .init();

    let args = Args::parse();
    info!("Autopress starting...");

    // Load config
    let config = Config::from_env();
    if config.genai_api_keys.is_empty() {
        anyhow::bail!("GENAI_API_KEYS must contain at least one key");
    }

    // Shared resilience state: one key cursor and one cooldown clock for
    // every generative call in the process.
    let provider = HttpProvider::new(&config.gen_model, &config.embed_model);
    let ctx = Arc::new(Mutex::new(ResilienceContext::new(KeyPool::new(
        config.genai_api_keys.clone(),
    ))));
    let executor = Executor::new(Arc::new(provider), ctx);

    let embedder = Arc::new(ExecutorEmbedder::new(executor.clone()));
    let fetcher = Arc::new(HttpFetcher::new());
    let publisher = Arc::new(RestPublisher::new(config.site_base_url.clone()));
    let distributor = Arc::new(WebhookDistributor::new(config.distribution_webhook.clone()));

    let mut pipeline = Pipeline::new(
        &config,
        executor,
        embedder,
        fetcher,
        publisher,
        distributor,
    )
    .await?;

    let mut categories = vec![args.category];
    categories.extend(args.fallback_categories);

    for category in &categories {
        match pipeline.run(category).await? {
            RunOutcome::Published {
                url,
                post_id,
                audit_iterations,
            } => {
                info!(
                    url = url.as_str(),
                    post_id = post_id.as_str(),
                    audit_iterations,
                    "run complete"
                );
                return Ok(());
            }
            RunOutcome::Skipped { reason } => {
                warn!(category = category.as_str(), reason, "run skipped, trying next category");
            }
            RunOutcome::Failed { reason } => {
                warn!(category = category.as_str(), reason, "run failed, trying next category");
            }
        }
    }

    warn!("no category produced a publishable post");
    Ok(())
}
