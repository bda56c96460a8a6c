//! SOTA root, area and category pages.

use scraper::Html;

use super::{element_text, first_link, selector};
use crate::{parse_count, TaskCount};

/// Links of every `.sota-all-tasks` block: areas on the root page, categories on an
/// area page.
pub fn parse_section_links(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let section = selector(".sota-all-tasks");

    document
        .select(&section)
        .filter_map(|block| first_link(block, page_url))
        .collect()
}

/// Task cards on an area or category page. The count comes from the card's second
/// `.text-muted` element.
pub fn parse_task_cards(html: &str, page_url: &str) -> Vec<TaskCount> {
    let document = Html::parse_document(html);
    let card_selector = selector(".card");
    let muted_selector = selector(".text-muted");

    document
        .select(&card_selector)
        .filter_map(|card| {
            let url = first_link(card, page_url)?;
            let count_text = card.select(&muted_selector).nth(1).map(element_text);
            Some(TaskCount {
                url,
                count: parse_count(count_text.as_deref()),
            })
        })
        .collect()
}
