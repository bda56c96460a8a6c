//! Task taxonomy walk: SOTA root, then areas, then categories.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::pages::taxonomy::{parse_section_links, parse_task_cards};
use crate::session::PageFetcher;
use crate::store::{HarvestStore, TaskCounts};
use crate::TaskCount;

#[derive(Debug, Default)]
pub struct TaxonomyStats {
    pub known_tasks: usize,
    pub areas_found: usize,
    pub categories_found: usize,
    pub cards_seen: usize,
    pub tasks_upserted: usize,
    pub errors: usize,
}

pub struct TaxonomyWalker<'a> {
    fetcher: &'a dyn PageFetcher,
    store: &'a dyn HarvestStore,
    base_url: String,
    pub stats: TaxonomyStats,
}

impl<'a> TaxonomyWalker<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, store: &'a dyn HarvestStore, base_url: &str) -> Self {
        Self {
            fetcher,
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
            stats: TaxonomyStats::default(),
        }
    }

    pub fn root_url(&self) -> String {
        format!("{}/sota", self.base_url)
    }

    /// Walks the hierarchy, merges what it sees into the stored counts, and upserts
    /// every pair. Returns the merged map. The session is closed before returning.
    pub async fn run(&mut self) -> Result<TaskCounts> {
        let result = self.walk().await;
        self.fetcher.close().await;
        let tasks = result?;

        info!("Found {} tasks, updating database...", tasks.len());
        for (url, count) in &tasks {
            self.store.upsert_task_count(url, *count).await?;
            self.stats.tasks_upserted += 1;
        }
        Ok(tasks)
    }

    async fn walk(&mut self) -> Result<TaskCounts> {
        let mut tasks = self.store.load_task_counts().await?;
        self.stats.known_tasks = tasks.len();
        info!("Found {} existing tasks", tasks.len());

        let root_url = self.root_url();
        info!("Scraping SOTA page: {}", root_url);
        let root = self
            .fetcher
            .fetch_html(&root_url)
            .await
            .context("Failed to load SOTA page")?;
        let areas = parse_section_links(&root, &root_url);
        self.stats.areas_found = areas.len();
        info!("Found {} areas, scraping categories...", areas.len());

        let mut categories = Vec::new();
        for area in &areas {
            let html = match self.fetcher.fetch_html(area).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Skipping area {}: {}", area, e);
                    self.stats.errors += 1;
                    continue;
                }
            };
            categories.extend(parse_section_links(&html, area));
            self.record_cards(&mut tasks, parse_task_cards(&html, area));
        }

        self.stats.categories_found = categories.len();
        info!("Found {} categories, scraping tasks...", categories.len());

        for category in &categories {
            let html = match self.fetcher.fetch_html(category).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Skipping category {}: {}", category, e);
                    self.stats.errors += 1;
                    continue;
                }
            };
            self.record_cards(&mut tasks, parse_task_cards(&html, category));
        }

        Ok(tasks)
    }

    fn record_cards(&mut self, tasks: &mut TaskCounts, cards: Vec<TaskCount>) {
        for card in cards {
            debug!("{}: {}", card.url, card.count);
            self.stats.cards_seen += 1;
            tasks.insert(card.url, card.count);
        }
    }

    pub fn print_stats(&self) {
        info!("=== Taxonomy Statistics ===");
        info!("Previously known tasks: {}", self.stats.known_tasks);
        info!("Areas found: {}", self.stats.areas_found);
        info!("Categories found: {}", self.stats.categories_found);
        info!("Task cards seen: {}", self.stats.cards_seen);
        info!("Tasks upserted: {}", self.stats.tasks_upserted);
        info!("Errors: {}", self.stats.errors);
    }
}
