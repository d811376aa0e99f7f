//! Knowledge store behavior: idempotent recording, the two-phase duplicate
//! guard, fail-open policy, cross-link retrieval, and embedding backfill.

use std::sync::Arc;

use chrono::Utc;
use tempfile::tempdir;

use autopress_common::KnowledgeEntry;
use autopress_pipeline::fixtures::{test_executor, ScriptedProvider, StaticEmbedder};
use autopress_pipeline::memory::KnowledgeStore;
use gen_client::Capability;

async fn open_store(
    path: std::path::PathBuf,
    provider: Arc<ScriptedProvider>,
    fail_open: bool,
) -> KnowledgeStore {
    KnowledgeStore::load(
        path,
        Arc::new(StaticEmbedder),
        test_executor(provider, &["k1"]),
        fail_open,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn recording_the_same_url_twice_keeps_one_entry() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let mut store = open_store(dir.path().join("knowledge.json"), provider, true).await;

    store
        .record("Ferris 2.0 Released", "https://site.example/p/1", "technology", None)
        .await
        .unwrap();
    store
        .record("Ferris 2.0 Released Again", "https://site.example/p/1", "technology", None)
        .await
        .unwrap();

    assert_eq!(store.entries().len(), 1);
    assert_eq!(store.entries()[0].title, "Ferris 2.0 Released");
}

#[tokio::test]
async fn lexical_guard_rejects_contained_title_without_a_remote_call() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let mut store =
        open_store(dir.path().join("knowledge.json"), provider.clone(), true).await;

    store
        .record(
            "The Complete Guide to Rust Memory Safety",
            "https://site.example/p/1",
            "technology",
            None,
        )
        .await
        .unwrap();

    // Containment path: the candidate appears verbatim inside a stored title.
    let duplicate = store
        .is_duplicate("Rust Memory Safety", "technology")
        .await
        .unwrap();
    assert!(duplicate);

    // Similarity-ratio path: nearly the same title, not a substring.
    let duplicate = store
        .is_duplicate("A Complete Guide to Rust Memory Safety", "technology")
        .await
        .unwrap();
    assert!(duplicate);

    // Phase 1 short-circuited both times, so the judge was never consulted.
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_judge_resolves_per_fail_open_policy() {
    let dir = tempdir().unwrap();

    // fail-open: an unreachable judge lets the candidate through.
    let provider = ScriptedProvider::new();
    provider.fail_always(Capability::DuplicateJudge);
    let mut store = open_store(dir.path().join("open.json"), provider, true).await;
    store
        .record(
            "Quantum Networking Advances in Europe",
            "https://site.example/p/1",
            "technology",
            None,
        )
        .await
        .unwrap();
    let duplicate = store
        .is_duplicate("Sourdough Baking Science", "food")
        .await
        .unwrap();
    assert!(!duplicate);

    // fail-closed: the same failure rejects it.
    let provider = ScriptedProvider::new();
    provider.fail_always(Capability::DuplicateJudge);
    let mut store = open_store(dir.path().join("closed.json"), provider, false).await;
    store
        .record(
            "Quantum Networking Advances in Europe",
            "https://site.example/p/2",
            "technology",
            None,
        )
        .await
        .unwrap();
    let duplicate = store
        .is_duplicate("Sourdough Baking Science", "food")
        .await
        .unwrap();
    assert!(duplicate);
}

#[tokio::test]
async fn judge_is_skipped_entirely_when_no_recent_history_exists() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let store = open_store(dir.path().join("knowledge.json"), provider.clone(), true).await;

    let duplicate = store
        .is_duplicate("Anything At All Really", "technology")
        .await
        .unwrap();

    assert!(!duplicate);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn related_links_exclude_the_current_title_and_respect_k() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let mut store = open_store(dir.path().join("knowledge.json"), provider, true).await;

    for (i, title) in [
        "Rust Async Runtimes Compared",
        "Rust Build Times in Practice",
        "Growing Tomatoes Indoors",
    ]
    .iter()
    .enumerate()
    {
        store
            .record(title, &format!("https://site.example/p/{i}"), "technology", None)
            .await
            .unwrap();
    }

    let related = store
        .nearest_related("Rust Async Runtimes Compared", 2)
        .await
        .unwrap();

    assert_eq!(related.len(), 2);
    assert!(related.iter().all(|l| l.title != "Rust Async Runtimes Compared"));
}

#[tokio::test]
async fn related_links_on_an_empty_store_are_empty() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let store = open_store(dir.path().join("knowledge.json"), provider, true).await;

    let related = store.nearest_related("Anything", 5).await.unwrap();
    assert!(related.is_empty());
}

#[tokio::test]
async fn refresh_bumps_verification_metadata_for_known_urls_only() {
    let dir = tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let mut store = open_store(dir.path().join("knowledge.json"), provider, true).await;

    store
        .record("Ferris 2.0 Released", "https://site.example/p/1", "technology", None)
        .await
        .unwrap();

    assert!(store.refresh("https://site.example/p/1").unwrap());
    assert_eq!(store.entries()[0].update_count, 1);

    assert!(!store.refresh("https://site.example/p/unknown").unwrap());
}

#[tokio::test]
async fn load_backfills_entries_that_lack_an_embedding() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("knowledge.json");

    let legacy = KnowledgeEntry {
        title: "An Older Article".to_string(),
        url: "https://site.example/p/old".to_string(),
        category: "technology".to_string(),
        publish_date: Utc::now(),
        embedding: Vec::new(),
        post_id: None,
        last_verified: Utc::now(),
        update_count: 0,
    };
    std::fs::write(&path, serde_json::to_string(&vec![legacy]).unwrap()).unwrap();

    let provider = ScriptedProvider::new();
    let store = open_store(path, provider, true).await;

    assert_eq!(store.entries().len(), 1);
    assert!(!store.entries()[0].embedding.is_empty());
}
