#![allow(dead_code)]

use async_trait::async_trait;
use pwc_harvester::session::PageFetcher;
use pwc_harvester::FetchError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Canned pages keyed by absolute URL. Unknown URLs fail like a 404.
#[derive(Default)]
pub struct FixtureSite {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
    closed: AtomicBool,
    latency: Duration,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Every fetch takes this long before answering.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FixtureSite {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Missing(url.to_string()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A task card as the area and category pages render it.
pub fn task_card(href: &str, count_text: &str) -> String {
    format!(
        r#"<div class="card"><a href="{href}"><h1>Task</h1></a><span class="text-muted">Area</span><span class="text-muted">{count_text}</span></div>"#
    )
}

/// A listing page holding one paper card per href.
pub fn listing(hrefs: &[&str]) -> String {
    let cards: String = hrefs
        .iter()
        .map(|href| {
            format!(
                r#"<div class="infinite-item paper-card"><h1><a href="{href}">Paper {href}</a></h1></div>"#
            )
        })
        .collect();
    format!("<html><body>{cards}</body></html>")
}

/// A paper detail page linking to `pdf_url`, with one task and a short leaderboard.
pub fn paper_page(pdf_url: &str) -> String {
    format!(
        r#"<html><body>
        <a class="badge badge-light" href="{pdf_url}">PDF</a>
        <div class="paper-tasks"><a href="/task/x">Task X</a></div>
        <div class="paper-datasets"><a href="/dataset/d">Dataset D</a><a href="/add">Add Datasets</a></div>
        <div class="method-section"><a href="/method/m">Method M</a></div>
        <div id="evaluation"><table>
          <tr><th>Task</th><th>Dataset</th><th>Model</th><th>Metric</th><th>Value</th><th>Rank</th></tr>
          <tr><td>Task X</td><td>Dataset D</td><td>Model A</td><td>Accuracy</td><td>91.5%</td><td>#1</td></tr>
        </table></div>
        </body></html>"#
    )
}
