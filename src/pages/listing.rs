//! Paginated paper listing of a task.

use scraper::Html;
use tracing::debug;

use super::{absolute_url, element_text, selector};
use crate::PaperRef;

/// URL of listing page `page` (1-based) for a task.
pub fn listing_page_url(task_url: &str, page: u32) -> String {
    format!("{}?page={}", task_url, page)
}

/// What a listing page holds: every paper card, and the ones that carried a title link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Cards present on the page, usable or not. Zero marks the end of the listing.
    pub card_count: usize,
    pub papers: Vec<PaperRef>,
}

pub fn parse_listing(html: &str, page_url: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let card_selector = selector(".infinite-item.paper-card");
    let title_selector = selector("h1 a");

    let mut page = ListingPage::default();
    for card in document.select(&card_selector) {
        page.card_count += 1;

        let Some(title_link) = card.select(&title_selector).next() else {
            debug!("No title element found, skipping paper card on {}", page_url);
            continue;
        };
        let href = title_link.value().attr("href").unwrap_or_default().trim();
        if href.is_empty() {
            continue;
        }

        page.papers.push(PaperRef {
            origin: absolute_url(page_url, href),
            title: element_text(title_link),
        });
    }
    page
}
