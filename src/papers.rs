//! Paper walk: paginate each task's listing and ingest every paper not stored yet.

use anyhow::Result;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::Deadline;
use crate::pages::listing::{listing_page_url, parse_listing};
use crate::pages::paper::parse_paper_page;
use crate::session::PageFetcher;
use crate::sink::{artifact_key, ArtifactSink, UploadJob, UploadOutcome};
use crate::store::{HarvestStore, TaskCounts};
use crate::{page_budget, PaperRef};

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Only walk this task URL.
    pub target_task: Option<String>,
    /// Stop after this many tasks (0 = all).
    pub max_tasks: usize,
    /// Consult the ingested-origins table before touching a paper.
    pub skip_ingested: bool,
}

#[derive(Debug, Default)]
pub struct WalkStats {
    pub tasks_visited: usize,
    pub pages_fetched: usize,
    pub papers_seen: usize,
    pub papers_processed: usize,
    pub already_ingested: usize,
    pub already_stored: usize,
    pub missing_pdf: usize,
    pub uploaded: usize,
    pub upload_failures: usize,
    pub errors: usize,
    pub timed_out: bool,
}

pub struct PaperWalker<'a> {
    fetcher: &'a dyn PageFetcher,
    store: &'a dyn HarvestStore,
    sink: &'a ArtifactSink,
    deadline: Deadline,
    options: WalkOptions,
    pub stats: WalkStats,
}

impl<'a> PaperWalker<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        store: &'a dyn HarvestStore,
        sink: &'a ArtifactSink,
        deadline: Deadline,
        options: WalkOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            sink,
            deadline,
            options,
            stats: WalkStats::default(),
        }
    }

    /// Walks `tasks` and returns how many papers were handed to the sink. Stops early,
    /// with the partial count, once the deadline passes. The session is closed on every
    /// exit path.
    pub async fn run(&mut self, tasks: &TaskCounts) -> Result<usize> {
        let result = self.walk(tasks).await;
        self.fetcher.close().await;
        result
    }

    async fn walk(&mut self, tasks: &TaskCounts) -> Result<usize> {
        info!("Found {} ML tasks", tasks.len());
        if let Some(target) = &self.options.target_task {
            if !tasks.contains_key(target) {
                warn!("Task {} is not in the task table; run the task scrape first", target);
            }
        }

        for (position, (task_url, count)) in tasks.iter().enumerate() {
            if let Some(target) = &self.options.target_task {
                if task_url != target {
                    continue;
                }
            }
            if self.options.max_tasks > 0 && self.stats.tasks_visited >= self.options.max_tasks {
                info!("Reached max tasks ({})", self.options.max_tasks);
                break;
            }

            let pages = page_budget(*count);
            info!("{}/{}: {} ({} pages)", position + 1, tasks.len(), task_url, pages);
            self.stats.tasks_visited += 1;

            if !self.walk_task(task_url, pages).await? {
                info!("Time limit reached, stopping scraping");
                self.stats.timed_out = true;
                break;
            }
        }

        Ok(self.stats.papers_processed)
    }

    /// Returns `false` when the deadline cut the task short.
    async fn walk_task(&mut self, task_url: &str, pages: u32) -> Result<bool> {
        // Listings drift while we paginate, so the same card can show up twice.
        let mut queued: HashSet<String> = HashSet::new();

        for page in 1..=pages {
            let page_url = listing_page_url(task_url, page);
            let html = match self.fetcher.fetch_html(&page_url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Skipping rest of {}: {}", task_url, e);
                    self.stats.errors += 1;
                    return Ok(true);
                }
            };
            self.stats.pages_fetched += 1;

            let listing = parse_listing(&html, &page_url);
            if listing.card_count == 0 {
                info!("No paper cards found on page {} of {}", page, task_url);
                return Ok(true);
            }

            let fresh: Vec<PaperRef> = listing
                .papers
                .into_iter()
                .filter(|paper| queued.insert(paper.origin.clone()))
                .collect();
            self.stats.papers_seen += fresh.len();

            let mut jobs = Vec::new();
            for paper in fresh {
                if self.deadline.expired() {
                    self.flush(jobs).await;
                    return Ok(false);
                }
                match self.prepare(paper).await {
                    Ok(Some(job)) => {
                        jobs.push(job);
                        self.stats.papers_processed += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Jobs already prepared on this page still get stored.
                        self.flush(jobs).await;
                        return Err(e);
                    }
                }
            }
            self.flush(jobs).await;
        }

        Ok(true)
    }

    /// Loads a paper page and turns it into an upload job, or `None` to skip it.
    async fn prepare(&mut self, paper: PaperRef) -> Result<Option<UploadJob>> {
        if self.options.skip_ingested && self.store.is_ingested(&paper.origin).await? {
            debug!("Already ingested: {}", paper.origin);
            self.stats.already_ingested += 1;
            return Ok(None);
        }

        let key = artifact_key(&paper.origin);
        if self.sink.exists(&key).await? {
            debug!("Already stored: {} ({})", paper.origin, key);
            self.stats.already_stored += 1;
            return Ok(None);
        }

        let html = match self.fetcher.fetch_html(&paper.origin).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Skipping paper {}: {}", paper.origin, e);
                self.stats.errors += 1;
                return Ok(None);
            }
        };

        let page = parse_paper_page(&html, &paper);
        let Some(pdf_url) = page.pdf_url else {
            info!("No link button found, skipping paper {}", paper.origin);
            self.stats.missing_pdf += 1;
            return Ok(None);
        };

        Ok(Some(UploadJob {
            key,
            pdf_url,
            metadata: page.metadata,
        }))
    }

    /// Waits for every queued upload before the walk moves on.
    async fn flush(&mut self, jobs: Vec<UploadJob>) {
        if jobs.is_empty() {
            return;
        }

        for (job, outcome) in self.sink.persist_all(jobs).await {
            match outcome {
                UploadOutcome::Stored => {
                    self.stats.uploaded += 1;
                    if let Err(e) = self
                        .store
                        .mark_ingested(&job.metadata.origin, &job.key, &job.pdf_url)
                        .await
                    {
                        warn!("Stored {} but could not record it: {:#}", job.key, e);
                    }
                }
                UploadOutcome::FetchFailed | UploadOutcome::WriteFailed => {
                    self.stats.upload_failures += 1;
                }
            }
        }
    }

    pub fn print_stats(&self) {
        info!("=== Paper Walk Statistics ===");
        info!("Tasks visited: {}", self.stats.tasks_visited);
        info!("Listing pages fetched: {}", self.stats.pages_fetched);
        info!("Distinct papers seen: {}", self.stats.papers_seen);
        info!("Papers processed: {}", self.stats.papers_processed);
        info!("Skipped (already ingested): {}", self.stats.already_ingested);
        info!("Skipped (already stored): {}", self.stats.already_stored);
        info!("Skipped (no PDF link): {}", self.stats.missing_pdf);
        info!("PDFs stored: {}", self.stats.uploaded);
        info!("Upload failures: {}", self.stats.upload_failures);
        info!("Errors: {}", self.stats.errors);
        if self.stats.timed_out {
            warn!("Run stopped at the time limit after {:?}", self.deadline.elapsed());
        }
    }
}
