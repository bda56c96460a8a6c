mod common;

use anyhow::{bail, Result};
use async_trait::async_trait;
use common::{listing, paper_page, FixtureSite};
use pwc_harvester::config::Deadline;
use pwc_harvester::papers::{PaperWalker, WalkOptions};
use pwc_harvester::sink::{artifact_key, ArtifactMetadata, ArtifactSink, FsArtifactStore};
use pwc_harvester::store::{HarvestStore, MemoryStore, TaskCounts};
use pwc_harvester::ProxyRecord;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TASK: &str = "https://paperswithcode.com/task/x";

fn paper_url(slug: &str) -> String {
    format!("https://paperswithcode.com/paper/{slug}")
}

fn tasks(entries: &[(&str, u32)]) -> TaskCounts {
    entries
        .iter()
        .map(|(url, count)| (url.to_string(), *count))
        .collect()
}

async fn pdf_server(slugs: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    for slug in slugs {
        Mock::given(method("GET"))
            .and(path(format!("/pdf/{slug}.pdf")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("%PDF-{slug}").into_bytes()))
            .mount(&server)
            .await;
    }
    server
}

struct Harness {
    _dir: TempDir,
    artifacts: Arc<FsArtifactStore>,
    sink: ArtifactSink,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = Arc::new(FsArtifactStore::open(dir.path()).await.unwrap());
    let sink = ArtifactSink::new(artifacts.clone(), reqwest::Client::new(), 2);
    Harness {
        _dir: dir,
        artifacts,
        sink,
    }
}

fn no_deadline() -> Deadline {
    Deadline::new(Duration::from_secs(3600))
}

/// Three listing pages: `a b`, then `b c` (drift), then nothing.
fn drifting_site(server: &MockServer) -> FixtureSite {
    let pdf = |slug: &str| format!("{}/pdf/{slug}.pdf", server.uri());
    FixtureSite::new()
        .page(&format!("{TASK}?page=1"), &listing(&["/paper/a", "/paper/b"]))
        .page(&format!("{TASK}?page=2"), &listing(&["/paper/b", "/paper/c"]))
        .page(&format!("{TASK}?page=3"), &listing(&[]))
        .page(&paper_url("a"), &paper_page(&pdf("a")))
        .page(&paper_url("b"), &paper_page(&pdf("b")))
        .page(&paper_url("c"), &paper_page(&pdf("c")))
}

#[tokio::test]
async fn walks_pages_until_an_empty_listing() {
    let server = pdf_server(&["a", "b", "c"]).await;
    let site = drifting_site(&server);
    let store = MemoryStore::default();
    let h = harness().await;

    let mut walker = PaperWalker::new(&site, &store, &h.sink, no_deadline(), WalkOptions::default());
    let processed = walker.run(&tasks(&[(TASK, 45)])).await.unwrap();

    assert_eq!(processed, 3);
    assert_eq!(walker.stats.pages_fetched, 3);
    assert_eq!(walker.stats.uploaded, 3);
    assert_eq!(site.request_count(&format!("{TASK}?page=4")), 0);
    assert_eq!(site.request_count(&paper_url("b")), 1);
    assert_eq!(store.ingested_count(), 3);
    assert!(site.is_closed());

    let key = artifact_key(&paper_url("a"));
    assert_eq!(std::fs::read(h.artifacts.path_for(&key)).unwrap(), b"%PDF-a");
    let sidecar: ArtifactMetadata =
        serde_json::from_slice(&std::fs::read(h.artifacts.metadata_path_for(&key)).unwrap()).unwrap();
    assert_eq!(sidecar.origin, paper_url("a"));
    assert_eq!(sidecar.tasks, r#"["Task X"]"#);
    assert_eq!(sidecar.datasets, r#"["Dataset D"]"#);
    assert_eq!(sidecar.methods, r#"["Method M"]"#);
    let results: serde_json::Value = serde_json::from_str(&sidecar.results).unwrap();
    assert_eq!(results[0]["model"], "Model A");
    assert_eq!(results[0]["value"], "91.5%");
    assert_eq!(results[0]["rank"], 1);
}

#[tokio::test]
async fn second_run_skips_stored_papers_without_loading_them() {
    let server = pdf_server(&["a", "b", "c"]).await;
    let h = harness().await;
    let store = MemoryStore::default();

    let first = drifting_site(&server);
    PaperWalker::new(&first, &store, &h.sink, no_deadline(), WalkOptions::default())
        .run(&tasks(&[(TASK, 45)]))
        .await
        .unwrap();

    let second = drifting_site(&server);
    let mut walker = PaperWalker::new(&second, &store, &h.sink, no_deadline(), WalkOptions::default());
    let processed = walker.run(&tasks(&[(TASK, 45)])).await.unwrap();

    assert_eq!(processed, 0);
    assert_eq!(walker.stats.already_stored, 3);
    assert_eq!(second.request_count(&paper_url("a")), 0);
}

#[tokio::test]
async fn page_budget_caps_large_tasks_at_twenty_pages() {
    let mut site = FixtureSite::new();
    for page in 1..=25 {
        let slug = format!("/paper/p{page}");
        site = site.page(&format!("{TASK}?page={page}"), &listing(&[slug.as_str()]));
    }
    let store = MemoryStore::default();
    let h = harness().await;

    let mut walker = PaperWalker::new(&site, &store, &h.sink, no_deadline(), WalkOptions::default());
    walker.run(&tasks(&[(TASK, 500)])).await.unwrap();

    assert_eq!(walker.stats.pages_fetched, 20);
    assert_eq!(site.request_count(&format!("{TASK}?page=20")), 1);
    assert_eq!(site.request_count(&format!("{TASK}?page=21")), 0);
    // Detail pages are not in the fixture, so each paper is skipped.
    assert_eq!(walker.stats.errors, 20);
    assert_eq!(walker.stats.papers_processed, 0);
}

#[tokio::test]
async fn zero_count_task_is_not_paginated() {
    let site = FixtureSite::new();
    let store = MemoryStore::default();
    let h = harness().await;

    let mut walker = PaperWalker::new(&site, &store, &h.sink, no_deadline(), WalkOptions::default());
    walker.run(&tasks(&[(TASK, 0)])).await.unwrap();

    assert!(site.requests().is_empty());
    assert_eq!(walker.stats.tasks_visited, 1);
}

#[tokio::test]
async fn expired_deadline_returns_partial_count_and_closes_session() {
    let server = pdf_server(&["a", "b", "c"]).await;
    let site = drifting_site(&server);
    let store = MemoryStore::default();
    let h = harness().await;

    let mut walker = PaperWalker::new(
        &site,
        &store,
        &h.sink,
        Deadline::new(Duration::ZERO),
        WalkOptions::default(),
    );
    let processed = walker.run(&tasks(&[(TASK, 45)])).await.unwrap();

    assert_eq!(processed, 0);
    assert!(walker.stats.timed_out);
    assert!(site.is_closed());
    assert_eq!(site.request_count(&paper_url("a")), 0);
    assert_eq!(site.request_count(&format!("{TASK}?page=2")), 0);
}

#[tokio::test]
async fn deadline_during_a_page_stores_papers_already_prepared() {
    let server = pdf_server(&["a", "b", "c"]).await;
    // Listing arrives at ~250ms and paper a at ~500ms, so the budget runs out before b.
    let site = drifting_site(&server).latency(Duration::from_millis(250));
    let store = MemoryStore::default();
    let h = harness().await;

    let mut walker = PaperWalker::new(
        &site,
        &store,
        &h.sink,
        Deadline::new(Duration::from_millis(400)),
        WalkOptions::default(),
    );
    let processed = walker.run(&tasks(&[(TASK, 45)])).await.unwrap();

    assert_eq!(processed, 1);
    assert!(walker.stats.timed_out);
    assert!(site.is_closed());
    assert_eq!(site.request_count(&paper_url("b")), 0);
    assert_eq!(walker.stats.uploaded, 1);
    assert_eq!(store.ingested_count(), 1);
    let key = artifact_key(&paper_url("a"));
    assert_eq!(std::fs::read(h.artifacts.path_for(&key)).unwrap(), b"%PDF-a");
}

/// Delegates to a [`MemoryStore`] but fails the ingested lookup for one origin.
struct FailingLookupStore {
    inner: MemoryStore,
    failing_origin: String,
}

#[async_trait]
impl HarvestStore for FailingLookupStore {
    async fn load_task_counts(&self) -> Result<TaskCounts> {
        self.inner.load_task_counts().await
    }

    async fn upsert_task_count(&self, url: &str, count: u32) -> Result<()> {
        self.inner.upsert_task_count(url, count).await
    }

    async fn random_proxy(&self) -> Result<Option<ProxyRecord>> {
        self.inner.random_proxy().await
    }

    async fn replace_proxies(&self, proxies: &[ProxyRecord]) -> Result<()> {
        self.inner.replace_proxies(proxies).await
    }

    async fn is_ingested(&self, origin: &str) -> Result<bool> {
        if origin == self.failing_origin {
            bail!("connection reset");
        }
        self.inner.is_ingested(origin).await
    }

    async fn mark_ingested(&self, origin: &str, filename: &str, pdf_url: &str) -> Result<()> {
        self.inner.mark_ingested(origin, filename, pdf_url).await
    }
}

#[tokio::test]
async fn store_failure_still_stores_papers_prepared_on_the_page() {
    let server = pdf_server(&["a", "b", "c"]).await;
    let site = drifting_site(&server);
    let store = FailingLookupStore {
        inner: MemoryStore::default(),
        failing_origin: paper_url("b"),
    };
    let h = harness().await;

    let options = WalkOptions {
        skip_ingested: true,
        ..WalkOptions::default()
    };
    let mut walker = PaperWalker::new(&site, &store, &h.sink, no_deadline(), options);
    let err = walker.run(&tasks(&[(TASK, 45)])).await.unwrap_err();

    assert_eq!(err.to_string(), "connection reset");
    assert!(site.is_closed());
    assert_eq!(walker.stats.papers_processed, 1);
    assert_eq!(walker.stats.uploaded, 1);
    assert_eq!(store.inner.ingested_count(), 1);
    let key = artifact_key(&paper_url("a"));
    assert_eq!(std::fs::read(h.artifacts.path_for(&key)).unwrap(), b"%PDF-a");
}

#[tokio::test]
async fn target_task_limits_the_walk() {
    let server = pdf_server(&["a", "b", "c"]).await;
    let site = drifting_site(&server);
    let store = MemoryStore::default();
    let h = harness().await;

    let options = WalkOptions {
        target_task: Some(TASK.to_string()),
        ..WalkOptions::default()
    };
    let other = "https://paperswithcode.com/task/other";
    let mut walker = PaperWalker::new(&site, &store, &h.sink, no_deadline(), options);
    let processed = walker
        .run(&tasks(&[(other, 30), (TASK, 45)]))
        .await
        .unwrap();

    assert_eq!(processed, 3);
    assert_eq!(walker.stats.tasks_visited, 1);
    assert_eq!(site.request_count(&format!("{other}?page=1")), 0);
}

#[tokio::test]
async fn failed_downloads_and_missing_links_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pdf/a.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let site = FixtureSite::new()
        .page(&format!("{TASK}?page=1"), &listing(&["/paper/a", "/paper/b"]))
        .page(&paper_url("a"), &paper_page(&format!("{}/pdf/a.pdf", server.uri())))
        .page(&paper_url("b"), "<html><body><h1>No PDF here</h1></body></html>");
    let store = MemoryStore::default();
    let h = harness().await;

    let mut walker = PaperWalker::new(&site, &store, &h.sink, no_deadline(), WalkOptions::default());
    let processed = walker.run(&tasks(&[(TASK, 5)])).await.unwrap();

    assert_eq!(processed, 1);
    assert_eq!(walker.stats.missing_pdf, 1);
    assert_eq!(walker.stats.upload_failures, 1);
    assert_eq!(walker.stats.uploaded, 0);
    assert_eq!(store.ingested_count(), 0);
    assert!(!h.artifacts.path_for(&artifact_key(&paper_url("a"))).exists());
}

#[tokio::test]
async fn ingested_origins_are_skipped_when_requested() {
    let server = pdf_server(&["a", "b", "c"]).await;
    let site = drifting_site(&server);
    let store = MemoryStore::default();
    store
        .mark_ingested(&paper_url("a"), "a.pdf", "https://arxiv.org/pdf/a")
        .await
        .unwrap();
    let h = harness().await;

    let options = WalkOptions {
        skip_ingested: true,
        ..WalkOptions::default()
    };
    let mut walker = PaperWalker::new(&site, &store, &h.sink, no_deadline(), options);
    let processed = walker.run(&tasks(&[(TASK, 45)])).await.unwrap();

    assert_eq!(processed, 2);
    assert_eq!(walker.stats.already_ingested, 1);
    assert_eq!(site.request_count(&paper_url("a")), 0);
}
