//! Content-plan queue lifecycle: series generation, one-topic-per-run
//! consumption, the drained-series transition, and persistence across loads.

use std::fs;

use tempfile::tempdir;

use autopress_common::ContentPlan;
use autopress_pipeline::fixtures::{test_executor, ScriptedProvider};
use autopress_pipeline::plan::Planner;
use gen_client::Capability;

const SERIES_JSON: &str = r#"{
    "series_name": "Ferris 2.0 Launch",
    "anchor": "https://news.example/ferris-2",
    "parts": ["Ferris 2.0: What Shipped", "Ferris 2.0: Migration Guide", "Ferris 2.0: Ecosystem Impact"]
}"#;

#[tokio::test(start_paused = true)]
async fn a_generated_series_is_consumed_one_topic_per_call() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    provider.respond(Capability::SeriesPlan, SERIES_JSON);
    let mut planner = Planner::load(
        dir.path().join("content_plan.json"),
        test_executor(provider.clone(), &["k1"]),
    );

    let first = planner.next_topic("technology").await.unwrap().unwrap();
    assert_eq!(first.title, "Ferris 2.0: What Shipped");
    assert!(first.is_series_continuation);

    let second = planner.next_topic("technology").await.unwrap().unwrap();
    assert_eq!(second.title, "Ferris 2.0: Migration Guide");

    let third = planner.next_topic("technology").await.unwrap().unwrap();
    assert_eq!(third.title, "Ferris 2.0: Ecosystem Impact");

    // One generation call seeded all three topics.
    assert_eq!(provider.calls_for(Capability::SeriesPlan), 1);

    // Draining the queue retires the series.
    assert!(planner.plan().active_series_name.is_none());
    assert!(planner.plan().queue.is_empty());
    assert_eq!(planner.plan().completed, vec!["Ferris 2.0 Launch"]);
}

#[tokio::test(start_paused = true)]
async fn an_active_series_survives_a_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("content_plan.json");

    let provider = ScriptedProvider::new();
    provider.respond(Capability::SeriesPlan, SERIES_JSON);
    let mut planner = Planner::load(path.clone(), test_executor(provider, &["k1"]));
    planner.next_topic("technology").await.unwrap().unwrap();

    // A fresh planner over the same file resumes the queue without any
    // generation call.
    let provider = ScriptedProvider::new();
    let mut planner = Planner::load(path, test_executor(provider.clone(), &["k1"]));
    assert_eq!(planner.plan().queue.len(), 2);

    let next = planner.next_topic("technology").await.unwrap().unwrap();
    assert_eq!(next.title, "Ferris 2.0: Migration Guide");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_series_generation_defers_to_ad_hoc_discovery() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    provider.fail_always(Capability::SeriesPlan);
    let mut planner = Planner::load(
        dir.path().join("content_plan.json"),
        test_executor(provider, &["k1"]),
    );

    let topic = planner.next_topic("technology").await.unwrap();
    assert!(topic.is_none());
}

#[tokio::test(start_paused = true)]
async fn an_empty_series_response_yields_no_topic() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    provider.respond(
        Capability::SeriesPlan,
        r#"{"series_name": "", "parts": []}"#,
    );
    let mut planner = Planner::load(
        dir.path().join("content_plan.json"),
        test_executor(provider, &["k1"]),
    );

    let topic = planner.next_topic("technology").await.unwrap();
    assert!(topic.is_none());
}

#[tokio::test(start_paused = true)]
async fn queued_topics_without_an_active_name_are_still_drained() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("content_plan.json");

    // A plan file left by an older writer: topics queued, no active name.
    let orphaned = ContentPlan {
        active_series_name: None,
        queue: ["Ferris 2.0: Migration Guide", "Ferris 2.0: Ecosystem Impact"]
            .map(String::from)
            .into(),
        ..ContentPlan::default()
    };
    fs::write(&path, serde_json::to_vec_pretty(&orphaned).unwrap()).unwrap();

    let provider = ScriptedProvider::new();
    let mut planner = Planner::load(path, test_executor(provider.clone(), &["k1"]));

    // The queue drains ahead of any fresh generation.
    let next = planner.next_topic("technology").await.unwrap().unwrap();
    assert_eq!(next.title, "Ferris 2.0: Migration Guide");
    assert_eq!(provider.calls(), 0);
    assert_eq!(planner.plan().queue.len(), 1);
}
