//! Paper detail pages: PDF link plus tasks, datasets, methods and leaderboard rows.

use scraper::Html;

use super::leaderboard::parse_evaluation;
use super::{absolute_url, element_text, selector};
use crate::{PaperMetadata, PaperRef};

/// Anchor texts the site shows as calls to action rather than names.
const PLACEHOLDER_TEXTS: &[&str] = &["Add Datasets", "relevant methods here"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperPage {
    pub pdf_url: Option<String>,
    pub metadata: PaperMetadata,
}

pub fn parse_paper_page(html: &str, paper: &PaperRef) -> PaperPage {
    let document = Html::parse_document(html);

    let pdf_url = document
        .select(&selector("a.badge.badge-light"))
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(|href| absolute_url(&paper.origin, href));

    let metadata = PaperMetadata {
        title: paper.title.clone(),
        origin: paper.origin.clone(),
        tasks: anchor_texts(&document, ".paper-tasks"),
        datasets: anchor_texts(&document, ".paper-datasets"),
        methods: anchor_texts(&document, ".method-section"),
        results: parse_evaluation(&document, &paper.origin),
    };

    PaperPage { pdf_url, metadata }
}

/// Distinct, non-empty anchor texts inside the first `section` element, in page order.
fn anchor_texts(document: &Html, section: &'static str) -> Vec<String> {
    let Some(container) = document.select(&selector(section)).next() else {
        return Vec::new();
    };

    let mut names: Vec<String> = Vec::new();
    for anchor in container.select(&selector("a")) {
        let text = element_text(anchor);
        if text.is_empty() || PLACEHOLDER_TEXTS.contains(&text.as_str()) || names.contains(&text) {
            continue;
        }
        names.push(text);
    }
    names
}
